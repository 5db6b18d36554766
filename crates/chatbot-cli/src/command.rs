//! Input line parsing.
//!
//! Plain text is a chat message; a leading `/` starts a command.

use std::path::PathBuf;

/// Help text for `/help`.
pub const HELP: &str = "\
Commands:
  /stop                    cancel the response being streamed
  /new                     start a new conversation
  /list                    list conversations
  /switch <n>              open conversation n
  /models                  list models
  /model <n>               answer with model n
  /files                   list uploaded files
  /upload <path> [role..]  upload a file readable by the given roles
  /history                 print the current transcript
  /help                    show this help
  /quit                    exit
Anything else is sent as a chat message.";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a chat message.
    Chat(String),
    /// Cancel the in-flight response.
    Stop,
    /// Create and open a new conversation.
    New,
    /// List conversations.
    List,
    /// Open the conversation at this zero-based index.
    Switch(usize),
    /// List models.
    Models,
    /// Select the model at this zero-based index.
    Model(usize),
    /// List uploaded files.
    Files,
    /// Upload a file.
    Upload {
        /// File to upload.
        path: PathBuf,
        /// Roles allowed to read it.
        roles: Vec<String>,
    },
    /// Print the transcript.
    History,
    /// Print help.
    Help,
    /// Exit.
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The command name is not known.
    #[error("unknown command /{0} (try /help)")]
    Unknown(String),

    /// A required argument is missing.
    #[error("/{command} needs {argument}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// What is missing.
        argument: &'static str,
    },

    /// A list position is not a positive number.
    #[error("{0:?} is not a list position")]
    InvalidIndex(String),
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands and bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Chat(line.to_string())));
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        let command = match name {
            "stop" => Self::Stop,
            "new" => Self::New,
            "list" => Self::List,
            "switch" => Self::Switch(parse_index("switch", words.next())?),
            "models" => Self::Models,
            "model" => Self::Model(parse_index("model", words.next())?),
            "files" => Self::Files,
            "upload" => {
                let path = words.next().ok_or(CommandError::MissingArgument {
                    command: "upload",
                    argument: "a file path",
                })?;
                Self::Upload {
                    path: PathBuf::from(path),
                    roles: words.map(str::to_string).collect(),
                }
            }
            "history" => Self::History,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Parse a one-based list position into a zero-based index.
fn parse_index(command: &'static str, arg: Option<&str>) -> Result<usize, CommandError> {
    let arg = arg.ok_or(CommandError::MissingArgument {
        command,
        argument: "a list position",
    })?;
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(CommandError::InvalidIndex(arg.to_string())),
    }
}
