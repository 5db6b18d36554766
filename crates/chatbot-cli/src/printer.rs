//! Transcript event output.

use std::io::{self, Write};

use tokio::sync::mpsc;

use chatbot_core::Message;
use chatbot_stream::{StreamOutcome, TranscriptEvent};

/// Writes transcript events as terminal lines.
///
/// While a reply streams, each update prints a single progress dot; the
/// final markup is printed once the stream finishes.
pub struct Printer<W: Write> {
    out: W,
    in_flight: Option<Message>,
}

impl<W: Write> Printer<W> {
    /// Create a printer writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            in_flight: None,
        }
    }

    /// Print one event.
    pub fn handle(&mut self, event: TranscriptEvent) -> io::Result<()> {
        match event {
            TranscriptEvent::UserMessageAppended(message) => {
                writeln!(self.out, "you> {}", message.content)?;
            }
            TranscriptEvent::AssistantMessageUpdated(message) => {
                write!(self.out, ".")?;
                self.in_flight = Some(message);
            }
            TranscriptEvent::StreamFinished(outcome) => {
                writeln!(self.out)?;
                match self.in_flight.take() {
                    Some(message) => self.write_message(&message)?,
                    None if outcome == StreamOutcome::Completed => {
                        writeln!(self.out, "bot> (empty response)")?;
                    }
                    None => {}
                }
            }
            TranscriptEvent::HistoryLoaded {
                conversation_id,
                messages,
            } => {
                writeln!(
                    self.out,
                    "-- conversation {conversation_id} ({} messages)",
                    messages.len()
                )?;
                for message in &messages {
                    self.write_message(message)?;
                }
            }
            TranscriptEvent::ModelSelected(model) => {
                writeln!(self.out, "-- model: {}", model.display_name)?;
            }
            TranscriptEvent::SubmissionRejected(reason) => {
                writeln!(self.out, "!! {reason}")?;
            }
        }
        self.out.flush()
    }

    /// Print a transcript entry.
    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let prefix = match (message.is_from_user, message.is_error) {
            (true, _) => "you>",
            (false, false) => "bot>",
            (false, true) => "bot!",
        };
        writeln!(self.out, "{prefix} {}", message.content.trim_end())
    }
}

/// Print events to stdout until the pipeline goes away.
pub async fn run(mut events: mpsc::Receiver<TranscriptEvent>) {
    let mut printer = Printer::new(io::stdout());
    while let Some(event) = events.recv().await {
        if let Err(e) = printer.handle(event) {
            tracing::warn!(error = %e, "Failed to write to stdout");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_core::{ConversationId, UserId};
    use chatbot_stream::{SubmitError, CANCELLED_MESSAGE};

    fn conv() -> ConversationId {
        ConversationId::new("c-1").unwrap()
    }

    fn user() -> UserId {
        UserId::new("u-1").unwrap()
    }

    fn output(events: Vec<TranscriptEvent>) -> String {
        let mut printer = Printer::new(Vec::new());
        for event in events {
            printer.handle(event).unwrap();
        }
        String::from_utf8(printer.out).unwrap()
    }

    #[test]
    fn streamed_reply_prints_dots_then_markup() {
        let text = output(vec![
            TranscriptEvent::UserMessageAppended(Message::user(conv(), user(), "Hello")),
            TranscriptEvent::AssistantMessageUpdated(Message::assistant(
                conv(),
                user(),
                "<p>H</p>\n",
                false,
            )),
            TranscriptEvent::AssistantMessageUpdated(Message::assistant(
                conv(),
                user(),
                "<p>Hi</p>\n",
                false,
            )),
            TranscriptEvent::StreamFinished(StreamOutcome::Completed),
        ]);
        assert_eq!(text, "you> Hello\n..\nbot> <p>Hi</p>\n");
    }

    #[test]
    fn cancelled_reply_is_marked() {
        let text = output(vec![
            TranscriptEvent::AssistantMessageUpdated(Message::assistant(
                conv(),
                user(),
                CANCELLED_MESSAGE,
                true,
            )),
            TranscriptEvent::StreamFinished(StreamOutcome::Cancelled),
        ]);
        assert_eq!(text, format!(".\nbot! {CANCELLED_MESSAGE}\n"));
    }

    #[test]
    fn history_and_rejections() {
        let text = output(vec![
            TranscriptEvent::HistoryLoaded {
                conversation_id: conv(),
                messages: vec![Message::user(conv(), user(), "earlier")],
            },
            TranscriptEvent::SubmissionRejected(SubmitError::AlreadyStreaming),
        ]);
        assert_eq!(
            text,
            "-- conversation c-1 (1 messages)\nyou> earlier\n!! a response is already streaming\n"
        );
    }
}
