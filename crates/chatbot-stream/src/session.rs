//! Session actor: a pipeline driven over channels.
//!
//! The pipeline is moved into its own task. UI code talks to it with
//! [`SessionCommand`]s and reads [`TranscriptEvent`]s back, so no
//! transcript state is shared across tasks.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use chatbot_core::{AiModel, ConversationId, Message};

use crate::controller::CancelHandle;
use crate::error::SubmitError;
use crate::pipeline::{ChatPipeline, TranscriptEvent};

const COMMAND_BUFFER: usize = 32;

/// Requests accepted by a running session.
#[derive(Debug)]
pub enum SessionCommand {
    /// Submit a chat message.
    Submit(String),
    /// Cancel the in-flight stream.
    Cancel,
    /// Show a conversation with its loaded history.
    SelectConversation {
        /// Conversation to show.
        conversation_id: ConversationId,
        /// Messages loaded from the backend.
        history: Vec<Message>,
    },
    /// Answer with a different model.
    SelectModel(AiModel),
    /// Reply with a copy of the transcript.
    Snapshot(oneshot::Sender<Vec<Message>>),
    /// Stop the session, cancelling any in-flight stream.
    Shutdown,
}

/// Owns a pipeline inside a spawned task.
pub struct ChatSession {
    pipeline: ChatPipeline,
    commands: mpsc::Receiver<SessionCommand>,
    deferred: VecDeque<SessionCommand>,
}

impl ChatSession {
    /// Spawn the session task.
    ///
    /// Events keep flowing to the receiver returned by
    /// [`ChatPipeline::new`].
    #[must_use]
    pub fn spawn(pipeline: ChatPipeline) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            commands: tx,
            cancel: pipeline.cancel_handle(),
        };
        let session = Self {
            pipeline,
            commands: rx,
            deferred: VecDeque::new(),
        };
        let task = tokio::spawn(session.run());
        (handle, task)
    }

    async fn run(mut self) {
        tracing::debug!("Chat session started");
        loop {
            let command = match self.deferred.pop_front() {
                Some(command) => command,
                None => match self.commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                SessionCommand::Submit(text) => self.submit(text).await,
                SessionCommand::Cancel => {
                    // No-op while idle.
                    self.pipeline.cancel_handle().cancel();
                }
                SessionCommand::SelectConversation {
                    conversation_id,
                    history,
                } => {
                    self.pipeline
                        .select_conversation(conversation_id, history)
                        .await;
                }
                SessionCommand::SelectModel(model) => self.pipeline.select_model(model).await,
                SessionCommand::Snapshot(reply) => {
                    let _ = reply.send(self.pipeline.transcript().messages().to_vec());
                }
                SessionCommand::Shutdown => break,
            }
        }
        tracing::debug!("Chat session stopped");
    }

    /// Run one submission while still serving commands.
    ///
    /// During the stream a second `Submit` is rejected, `Cancel` and
    /// `Shutdown` cancel at once, and everything else waits until the
    /// stream has finished.
    async fn submit(&mut self, text: String) {
        let events = self.pipeline.event_sender();
        let cancel = self.pipeline.cancel_handle();
        let mut commands_open = true;

        let submit = self.pipeline.submit(&text);
        tokio::pin!(submit);

        let result = loop {
            tokio::select! {
                result = &mut submit => break result,
                command = self.commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Submit(_)) => {
                        let _ = events
                            .send(TranscriptEvent::SubmissionRejected(SubmitError::AlreadyStreaming))
                            .await;
                    }
                    Some(SessionCommand::Cancel) => {
                        cancel.cancel();
                    }
                    Some(SessionCommand::Shutdown) => {
                        cancel.cancel();
                        self.deferred.push_back(SessionCommand::Shutdown);
                    }
                    Some(other) => self.deferred.push_back(other),
                    None => commands_open = false,
                },
            }
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "Submission rejected");
            let _ = events.send(TranscriptEvent::SubmissionRejected(e)).await;
        }
    }
}

/// Cloneable front door to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancelHandle,
}

impl SessionHandle {
    /// Raw command sender, for collaborators that only need to send.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<SessionCommand> {
        self.commands.clone()
    }

    /// Submit a chat message.
    ///
    /// The outcome arrives as events; rejections while a stream is in
    /// flight arrive as `TranscriptEvent::SubmissionRejected`.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::SessionClosed` if the session has stopped.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), SubmitError> {
        self.send(SessionCommand::Submit(text.into())).await
    }

    /// Cancel the in-flight stream directly, without a channel hop.
    ///
    /// Returns `false` when nothing is streaming.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Whether a response is streaming.
    #[must_use]
    pub fn is_responding(&self) -> bool {
        self.cancel.is_responding()
    }

    /// Show a conversation with its loaded history.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::SessionClosed` if the session has stopped.
    pub async fn select_conversation(
        &self,
        conversation_id: ConversationId,
        history: Vec<Message>,
    ) -> Result<(), SubmitError> {
        self.send(SessionCommand::SelectConversation {
            conversation_id,
            history,
        })
        .await
    }

    /// Answer with a different model.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::SessionClosed` if the session has stopped.
    pub async fn select_model(&self, model: AiModel) -> Result<(), SubmitError> {
        self.send(SessionCommand::SelectModel(model)).await
    }

    /// Copy of the transcript once the session is idle.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::SessionClosed` if the session has stopped.
    pub async fn snapshot(&self) -> Result<Vec<Message>, SubmitError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| SubmitError::SessionClosed)
    }

    /// Stop the session.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::SessionClosed` if the session has already
    /// stopped.
    pub async fn shutdown(&self) -> Result<(), SubmitError> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SubmitError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SubmitError::SessionClosed)
    }
}
