//! Chatbot CLI - terminal client for the streaming chat backend.
//!
//! This is the entry point for the `chatbot` binary.

mod command;
mod printer;
mod sidebar;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatbot_api::{ApiConfig, BackendClient};
use chatbot_core::{AiModel, User};
use chatbot_stream::{
    ChatPipeline, ChatSession, HttpTransport, MarkdownRenderer, SessionHandle, StreamConfig,
};

use command::{Command, HELP};
use printer::Printer;
use sidebar::Sidebar;

/// Log filter for `--debug`.
const DEBUG_FILTER: &str = "chatbot=debug,chatbot_stream=debug,chatbot_api=debug,warn";

/// Chatbot CLI - chat with the backend from a terminal.
#[derive(Parser, Debug)]
#[command(name = "chatbot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend URL.
    #[arg(long, env = "CHATBOT_BASE_URL", default_value = "http://localhost:8000")]
    base_url: String,

    /// User id issued at login.
    #[arg(long, env = "CHATBOT_USER_ID")]
    user_id: String,

    /// Login name.
    #[arg(long, env = "CHATBOT_USERNAME")]
    username: String,

    /// Role name.
    #[arg(long, env = "CHATBOT_USER_ROLE", default_value = "user")]
    role: String,

    /// Model to answer with, by model name. Defaults to the first offered.
    #[arg(long, env = "CHATBOT_MODEL")]
    model: Option<String>,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.debug);

    let user = User::new(&args.user_id, args.username.clone(), args.role.clone())
        .context("invalid user id")?;

    // Create clients
    let api = BackendClient::new(&ApiConfig::new(&args.base_url));
    let config = StreamConfig::default();
    let transport = Arc::new(HttpTransport::new(&args.base_url, &config));
    let renderer = Arc::new(MarkdownRenderer::new(config.max_render_bytes));

    // Start the chat session and its printer
    let (pipeline, events) = ChatPipeline::new(transport, renderer, user.clone(), &config);
    let (session, session_task) = ChatSession::spawn(pipeline);
    let printer_task = tokio::spawn(printer::run(events));

    let mut repl = Repl::new(api, user, session.clone());
    let result = match repl.bootstrap(args.model.as_deref()).await {
        Ok(()) => {
            println!("Type a message, or /help for commands.");
            repl.run().await
        }
        Err(e) => Err(e),
    };

    // Stopping the session closes the event channel, which ends the printer.
    let _ = session.shutdown().await;
    wait_for("chat session", session_task).await;
    wait_for("printer", printer_task).await;

    result
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Join a background task, logging a panic or abort. Returns whether it
/// ran to completion.
async fn wait_for(task: &str, handle: tokio::task::JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(task, error = %e, "Background task failed");
            false
        }
    }
}

/// Position of the model named `preferred`, or of the first model.
fn pick_model(models: &[AiModel], preferred: Option<&str>) -> Option<usize> {
    preferred
        .and_then(|name| models.iter().position(|m| m.model_name == name))
        .or_else(|| (!models.is_empty()).then_some(0))
}

/// Interactive loop state.
struct Repl {
    api: BackendClient,
    user: User,
    session: SessionHandle,
    sidebar: Sidebar,
    models: Vec<AiModel>,
    model_index: Option<usize>,
}

impl Repl {
    fn new(api: BackendClient, user: User, session: SessionHandle) -> Self {
        let sidebar = Sidebar::new(api.clone(), user.id.clone(), session.sender());
        Self {
            api,
            user,
            session,
            sidebar,
            models: Vec::new(),
            model_index: None,
        }
    }

    /// Pick a model and open a conversation.
    async fn bootstrap(&mut self, preferred: Option<&str>) -> anyhow::Result<()> {
        self.models = self
            .api
            .get_ai_models()
            .await
            .context("failed to load models")?;
        let index = pick_model(&self.models, preferred).context("the backend offers no models")?;
        if let Some(name) = preferred {
            if self.models[index].model_name != name {
                tracing::warn!(model = name, "Requested model not offered, using the first");
            }
        }
        self.select_model(index).await?;

        self.sidebar
            .refresh()
            .await
            .context("failed to load conversations")?;
        if self.sidebar.conversations().is_empty() {
            self.sidebar
                .new_conversation()
                .await
                .context("failed to create a conversation")?;
        } else {
            self.sidebar
                .select(0)
                .await
                .context("failed to open the latest conversation")?;
        }
        Ok(())
    }

    /// Read lines until `/quit`, end of input, or Ctrl-C while idle.
    async fn run(&mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match Command::parse(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => {
                            if let Err(e) = self.execute(command).await {
                                println!("!! {e:#}");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => println!("!! {e}"),
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    if self.session.cancel() {
                        tracing::debug!("Cancel requested from Ctrl-C");
                    } else {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Chat(text) => self.session.submit(text).await?,
            Command::Stop => {
                if !self.session.cancel() {
                    println!("-- nothing to stop");
                }
            }
            Command::New => self.sidebar.new_conversation().await?,
            Command::List => {
                self.sidebar.refresh().await?;
                let selected = self.sidebar.selected();
                for (i, conversation) in self.sidebar.conversations().iter().enumerate() {
                    let marker = if selected == Some(i) { '*' } else { ' ' };
                    println!("{marker} {:>2}. {}", i + 1, conversation.title);
                }
            }
            Command::Switch(index) => self.sidebar.select(index).await?,
            Command::Models => {
                for (i, model) in self.models.iter().enumerate() {
                    let marker = if self.model_index == Some(i) { '*' } else { ' ' };
                    println!("{marker} {:>2}. {} ({})", i + 1, model.display_name, model.description);
                }
            }
            Command::Model(index) => self.select_model(index).await?,
            Command::Files => {
                for group in self.api.list_files(&self.user.id).await? {
                    println!("{}:", group.name);
                    for file in &group.list_files {
                        println!("    {} ({}, {})", file.file_name, file.username, file.timestamp);
                    }
                }
            }
            Command::Upload { path, roles } => self.upload(path, roles).await?,
            Command::History => {
                if self.session.is_responding() {
                    println!("-- wait for the reply to finish");
                    return Ok(());
                }
                let mut out = Printer::new(io::stdout());
                for message in self.session.snapshot().await? {
                    out.write_message(&message)?;
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        Ok(())
    }

    async fn select_model(&mut self, index: usize) -> anyhow::Result<()> {
        let model = self
            .models
            .get(index)
            .with_context(|| format!("there is no model {}", index + 1))?;
        self.session.select_model(model.clone()).await?;
        self.model_index = Some(index);
        Ok(())
    }

    async fn upload(&self, path: PathBuf, mut roles: Vec<String>) -> anyhow::Result<()> {
        if roles.is_empty() {
            roles.push(self.user.role.clone());
        }
        let uploaded = self
            .api
            .upload_files(&self.user.id, &[path], &roles)
            .await?;
        for file in uploaded {
            println!("-- uploaded {} as {}", file.file_name, file.name);
        }
        Ok(())
    }
}
