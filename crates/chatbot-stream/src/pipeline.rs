//! Submission to transcript: the streaming chat pipeline.
//!
//! One submission runs request issuance, chunked read, frame decoding,
//! rendering and transcript reconciliation to a single terminal outcome.
//! Every transcript mutation is published as a [`TranscriptEvent`].

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chatbot_core::{AiModel, ChatRequest, ConversationId, Message, User};

use crate::config::StreamConfig;
use crate::controller::{CancelHandle, StreamController, StreamOutcome, StreamState};
use crate::decoder;
use crate::error::{Result, StreamError, SubmitError};
use crate::render::ContentRenderer;
use crate::transcript::Transcript;
use crate::transport::Transport;

/// Transcript mutations published to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A user message was appended.
    UserMessageAppended(Message),
    /// The in-flight assistant message was created or replaced.
    AssistantMessageUpdated(Message),
    /// The stream reached a terminal outcome.
    StreamFinished(StreamOutcome),
    /// A conversation was selected and its history swapped in.
    HistoryLoaded {
        /// Selected conversation.
        conversation_id: ConversationId,
        /// Loaded messages.
        messages: Vec<Message>,
    },
    /// A different model will answer from now on.
    ModelSelected(AiModel),
    /// A submission was refused; the transcript is unchanged.
    SubmissionRejected(SubmitError),
}

/// Drives one stream at a time into a transcript.
pub struct ChatPipeline {
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn ContentRenderer>,
    controller: StreamController,
    transcript: Transcript,
    user: User,
    model: Option<AiModel>,
    max_frame_bytes: usize,
    events: mpsc::Sender<TranscriptEvent>,
}

impl ChatPipeline {
    /// Create a pipeline for `user` and the receiver for its events.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn ContentRenderer>,
        user: User,
        config: &StreamConfig,
    ) -> (Self, mpsc::Receiver<TranscriptEvent>) {
        let (events, rx) = mpsc::channel(config.event_buffer.max(1));
        let pipeline = Self {
            transport,
            renderer,
            controller: StreamController::new(),
            transcript: Transcript::new(user.id.clone()),
            user,
            model: None,
            max_frame_bytes: config.max_render_bytes,
            events,
        };
        (pipeline, rx)
    }

    /// Handle for cancelling the in-flight stream from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.controller.cancel_handle()
    }

    /// Sender for publishing events alongside the pipeline.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::Sender<TranscriptEvent> {
        self.events.clone()
    }

    /// The transcript.
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Controller state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.controller.state()
    }

    /// Show `conversation_id` with its loaded `history`.
    pub async fn select_conversation(
        &mut self,
        conversation_id: ConversationId,
        history: Vec<Message>,
    ) {
        tracing::debug!(
            conversation_id = %conversation_id,
            messages = history.len(),
            "Selecting conversation"
        );
        self.transcript
            .replace_history(conversation_id.clone(), history.clone());
        self.emit(TranscriptEvent::HistoryLoaded {
            conversation_id,
            messages: history,
        })
        .await;
    }

    /// Answer subsequent submissions with `model`.
    pub async fn select_model(&mut self, model: AiModel) {
        tracing::debug!(model = %model.model_name, "Selecting model");
        self.model = Some(model.clone());
        self.emit(TranscriptEvent::ModelSelected(model)).await;
    }

    /// Submit `text` and stream the reply to completion.
    ///
    /// The user message is appended before the request is sent. Whatever
    /// happens afterwards, the call returns a terminal outcome and leaves
    /// the pipeline ready for the next submission.
    ///
    /// # Errors
    ///
    /// Returns a `SubmitError` without touching the transcript if the
    /// input is empty, no conversation or model is selected, or a stream
    /// is already in flight.
    pub async fn submit(&mut self, text: &str) -> std::result::Result<StreamOutcome, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        let conversation_id = self
            .transcript
            .conversation_id()
            .cloned()
            .ok_or(SubmitError::NoConversation)?;
        let model = self.model.clone().ok_or(SubmitError::NoModel)?;
        let cancel = self.controller.begin()?;

        self.transcript.append_user_message(&conversation_id, text);
        if let Some(message) = self.transcript.last().cloned() {
            self.emit(TranscriptEvent::UserMessageAppended(message)).await;
        }

        // The backend owns persistence and rebuilds context itself.
        let request = ChatRequest::new(&self.user, conversation_id.clone(), &model, text, Vec::new());

        tracing::debug!(
            conversation_id = %conversation_id,
            model = %model.model_name,
            "Submitting chat request"
        );

        let outcome = match self.stream_reply(&request, &conversation_id, &cancel).await {
            Ok(()) => StreamOutcome::Completed,
            Err(StreamError::CancelledByUser) => StreamOutcome::Cancelled,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Chat stream failed"
                );
                StreamOutcome::Failed(e.kind())
            }
        };

        if let Some(content) = outcome.terminal_message() {
            let message = self
                .transcript
                .apply_assistant_update(&conversation_id, content.to_string(), true)
                .clone();
            self.emit(TranscriptEvent::AssistantMessageUpdated(message))
                .await;
        }

        self.controller.finish(outcome);
        tracing::debug!(conversation_id = %conversation_id, ?outcome, "Chat stream finished");
        self.emit(TranscriptEvent::StreamFinished(outcome)).await;
        Ok(outcome)
    }

    async fn stream_reply(
        &mut self,
        request: &ChatRequest,
        conversation_id: &ConversationId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StreamError::CancelledByUser),
            result = self.transport.send(request, cancel.clone()) => result?,
        };

        let mut frames = decoder::frames(body, self.max_frame_bytes);
        let mut accumulated = String::new();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(StreamError::CancelledByUser),
                next = frames.next() => next,
            };
            let Some(frame) = next else {
                break;
            };
            let frame = frame?;

            // Frames decoded from one chunk arrive back to back.
            if cancel.is_cancelled() {
                return Err(StreamError::CancelledByUser);
            }

            accumulated.push_str(&frame.content_delta);
            let markup = self.renderer.render(&accumulated)?;
            let message = self
                .transcript
                .apply_assistant_update(conversation_id, markup, false)
                .clone();
            self.emit(TranscriptEvent::AssistantMessageUpdated(message))
                .await;
        }

        // A cancelled body ends like a closed one.
        if cancel.is_cancelled() {
            return Err(StreamError::CancelledByUser);
        }
        Ok(())
    }

    async fn emit(&self, event: TranscriptEvent) {
        // Nobody listening is not an error for the pipeline.
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{CANCELLED_MESSAGE, FAILURE_MESSAGE};
    use crate::error::FailureKind;
    use crate::render::MarkdownRenderer;
    use crate::transport::ScriptedTransport;
    use chatbot_core::Role;

    fn model() -> AiModel {
        AiModel {
            model: "ollama".to_string(),
            model_name: "mistral".to_string(),
            display_name: "Ollama - Mistral".to_string(),
            description: String::new(),
        }
    }

    fn frame(delta: &str) -> String {
        format!("data: {}\n\n", serde_json::json!({ "content": delta }))
    }

    async fn ready_pipeline(
        transport: Arc<ScriptedTransport>,
    ) -> (ChatPipeline, mpsc::Receiver<TranscriptEvent>) {
        let user = User::new("u-1", "alice", "user").unwrap();
        let (mut pipeline, mut events) = ChatPipeline::new(
            transport,
            Arc::new(MarkdownRenderer::default()),
            user,
            &StreamConfig::default(),
        );
        pipeline
            .select_conversation(ConversationId::new("c-1").unwrap(), Vec::new())
            .await;
        pipeline.select_model(model()).await;
        // Drain the selection events.
        events.recv().await.unwrap();
        events.recv().await.unwrap();
        (pipeline, events)
    }

    fn drain(events: &mut mpsc::Receiver<TranscriptEvent>) -> Vec<TranscriptEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn hello_hi_round_trip() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_body("data: {\"content\":\"Hi\"}\n\n");
        let (mut pipeline, mut events) = ready_pipeline(Arc::clone(&transport)).await;

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(pipeline.state(), StreamState::Completed);

        let messages = pipeline.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_from_user);
        assert_eq!(messages[0].content, "Hello");
        assert!(messages[1].is_assistant());
        assert_eq!(messages[1].content, "<p>Hi</p>\n");
        assert!(!messages[1].is_error);

        let events = drain(&mut events);
        assert!(matches!(events[0], TranscriptEvent::UserMessageAppended(_)));
        assert!(matches!(events[1], TranscriptEvent::AssistantMessageUpdated(_)));
        assert_eq!(
            events[2],
            TranscriptEvent::StreamFinished(StreamOutcome::Completed)
        );

        let request = &transport.requests()[0];
        assert_eq!(request.user_id().as_str(), "u-1");
        assert_eq!(request.username(), "alice");
        assert_eq!(request.user_role(), "user");
        assert_eq!(request.role(), Role::User);
        assert_eq!(request.content(), "Hello");
        assert_eq!(request.conversation_id().as_str(), "c-1");
        assert_eq!(request.model(), "ollama");
        assert_eq!(request.model_name(), "mistral");
        assert!(request.history().is_empty());
    }

    #[tokio::test]
    async fn many_frames_make_one_assistant_message() {
        let transport = Arc::new(ScriptedTransport::new());
        let body: String = (0..10).map(|i| frame(&format!("w{i} "))).collect();
        transport.push_body(&body);
        let (mut pipeline, mut events) = ready_pipeline(transport).await;

        pipeline.submit("count").await.unwrap();

        let assistants: Vec<&Message> = pipeline
            .transcript()
            .messages()
            .iter()
            .filter(|m| m.is_assistant())
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].content, "<p>w0 w1 w2 w3 w4 w5 w6 w7 w8 w9</p>\n");

        let updates = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, TranscriptEvent::AssistantMessageUpdated(_)))
            .count();
        assert_eq!(updates, 10);
    }

    #[tokio::test]
    async fn cancel_mid_stream_stops_mutation() {
        let transport = Arc::new(ScriptedTransport::new());
        let writer = transport.push_stream();
        let (mut pipeline, mut events) = ready_pipeline(transport).await;
        let handle = pipeline.cancel_handle();

        let (outcome, ()) = tokio::join!(pipeline.submit("Hello"), async {
            writer.chunk(frame("one "));
            writer.chunk(frame("two "));
            let mut updates = 0;
            while updates < 2 {
                if let TranscriptEvent::AssistantMessageUpdated(_) = events.recv().await.unwrap() {
                    updates += 1;
                }
            }
            assert!(handle.cancel());
            for delta in ["three ", "four ", "five"] {
                writer.chunk(frame(delta));
            }
        });

        assert_eq!(outcome.unwrap(), StreamOutcome::Cancelled);
        assert_eq!(pipeline.state(), StreamState::Cancelled);

        let messages = pipeline.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, CANCELLED_MESSAGE);
        assert!(messages[1].is_error);

        let rest = drain(&mut events);
        assert_eq!(rest.len(), 2);
        match &rest[0] {
            TranscriptEvent::AssistantMessageUpdated(m) => assert_eq!(m.content, CANCELLED_MESSAGE),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            rest[1],
            TranscriptEvent::StreamFinished(StreamOutcome::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_before_first_frame_appends_terminal_message() {
        let transport = Arc::new(ScriptedTransport::new());
        let writer = transport.push_stream();
        let (mut pipeline, mut events) = ready_pipeline(transport).await;
        let handle = pipeline.cancel_handle();

        let (outcome, ()) = tokio::join!(pipeline.submit("Hello"), async {
            // Wait until the user message is in, then cancel.
            events.recv().await.unwrap();
            assert!(handle.cancel());
            drop(writer);
        });

        assert_eq!(outcome.unwrap(), StreamOutcome::Cancelled);
        let last = pipeline.transcript().last().unwrap();
        assert!(last.is_assistant());
        assert_eq!(last.content, CANCELLED_MESSAGE);
        assert!(last.is_error);
    }

    #[tokio::test]
    async fn malformed_frame_fails_with_fixed_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_body("data: {\"content\":\"partial\"}\n\ndata: {not-json}\n\n");
        let (mut pipeline, _events) = ready_pipeline(transport).await;

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Failed(FailureKind::FrameParse));

        let messages = pipeline.transcript().messages();
        assert_eq!(messages.len(), 2);
        let last = &messages[1];
        assert!(last.is_error);
        assert_eq!(last.content, FAILURE_MESSAGE);
        assert!(!last.content.contains("not-json"));
    }

    #[tokio::test]
    async fn oversized_unterminated_frame_fails_with_fixed_text() {
        let transport = Arc::new(ScriptedTransport::new());
        let writer = transport.push_stream();
        let user = User::new("u-1", "alice", "user").unwrap();
        let config = StreamConfig {
            max_render_bytes: 1024,
            ..StreamConfig::default()
        };
        let (mut pipeline, _events) = ChatPipeline::new(
            transport,
            Arc::new(MarkdownRenderer::new(config.max_render_bytes)),
            user,
            &config,
        );
        pipeline
            .select_conversation(ConversationId::new("c-1").unwrap(), Vec::new())
            .await;
        pipeline.select_model(model()).await;

        // The body never sends a newline and never closes.
        writer.chunk("data: {\"content\":\"");
        for _ in 0..4 {
            writer.chunk("a".repeat(512));
        }

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Failed(FailureKind::FrameParse));

        let last = pipeline.transcript().last().unwrap();
        assert!(last.is_error);
        assert_eq!(last.content, FAILURE_MESSAGE);
        drop(writer);
    }

    #[tokio::test]
    async fn transport_failure_fails_with_fixed_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_connect_error("connection refused");
        let (mut pipeline, _events) = ready_pipeline(transport).await;

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Failed(FailureKind::Transport));

        let last = pipeline.transcript().last().unwrap();
        assert!(last.is_assistant());
        assert_eq!(last.content, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn mid_read_failure_replaces_partial_reply() {
        let transport = Arc::new(ScriptedTransport::new());
        let writer = transport.push_stream();
        writer.chunk(frame("half"));
        writer.fail("connection reset");
        let (mut pipeline, _events) = ready_pipeline(transport).await;

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Failed(FailureKind::Transport));
        assert_eq!(pipeline.transcript().len(), 2);
        assert_eq!(pipeline.transcript().last().unwrap().content, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn render_failure_fails_with_fixed_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_body(&frame("this is longer than the limit"));
        let user = User::new("u-1", "alice", "user").unwrap();
        let (mut pipeline, _events) = ChatPipeline::new(
            transport,
            Arc::new(MarkdownRenderer::new(8)),
            user,
            &StreamConfig::default(),
        );
        pipeline
            .select_conversation(ConversationId::new("c-1").unwrap(), Vec::new())
            .await;
        pipeline.select_model(model()).await;

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Failed(FailureKind::Render));
        assert_eq!(pipeline.transcript().last().unwrap().content, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn rejected_submissions_leave_transcript_alone() {
        let transport = Arc::new(ScriptedTransport::new());
        let user = User::new("u-1", "alice", "user").unwrap();
        let (mut pipeline, _events) = ChatPipeline::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(MarkdownRenderer::default()),
            user,
            &StreamConfig::default(),
        );

        assert_eq!(pipeline.submit("   ").await, Err(SubmitError::EmptyInput));
        assert_eq!(pipeline.submit("hi").await, Err(SubmitError::NoConversation));

        pipeline
            .select_conversation(ConversationId::new("c-1").unwrap(), Vec::new())
            .await;
        assert_eq!(pipeline.submit("hi").await, Err(SubmitError::NoModel));

        assert!(pipeline.transcript().is_empty());
        assert!(transport.requests().is_empty());
        assert_eq!(pipeline.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn next_submission_after_cancel_is_not_cancelled() {
        let transport = Arc::new(ScriptedTransport::new());
        let writer = transport.push_stream();
        transport.push_body(&frame("fresh"));
        let (mut pipeline, mut events) = ready_pipeline(transport).await;
        let handle = pipeline.cancel_handle();

        let (first, ()) = tokio::join!(pipeline.submit("one"), async {
            events.recv().await.unwrap();
            handle.cancel();
            drop(writer);
        });
        assert_eq!(first.unwrap(), StreamOutcome::Cancelled);

        // Cancelling while idle must not poison the next stream.
        assert!(!handle.cancel());

        let second = pipeline.submit("two").await.unwrap();
        assert_eq!(second, StreamOutcome::Completed);
        assert_eq!(pipeline.transcript().last().unwrap().content, "<p>fresh</p>\n");
        assert_eq!(pipeline.transcript().len(), 4);
    }

    #[tokio::test]
    async fn empty_response_adds_no_assistant_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_body(": keep-alive\n\n");
        let (mut pipeline, _events) = ready_pipeline(transport).await;

        let outcome = pipeline.submit("Hello").await.unwrap();
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(pipeline.transcript().len(), 1);
    }
}
