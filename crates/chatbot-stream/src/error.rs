//! Error types for the streaming pipeline.

use thiserror::Error;

/// A result type using `StreamError`.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that terminate an in-flight stream.
///
/// None of these messages are shown to the user; the pipeline logs them and
/// writes a fixed string into the transcript instead.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The connection could not be established, failed mid-read, or the
    /// server answered without a readable body.
    #[error("transport error: {0}")]
    Transport(String),

    /// A complete `data:` line did not contain a valid frame.
    #[error("malformed frame {line:?}: {source}")]
    FrameParse {
        /// The offending line, prefix included.
        line: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A frame line grew past the decoder's limit.
    #[error("frame line exceeds {limit} bytes")]
    FrameTooLarge {
        /// The line limit in bytes.
        limit: usize,
    },

    /// The accumulated text could not be rendered.
    #[error("render error: {0}")]
    Render(String),

    /// The user cancelled the request.
    #[error("cancelled by user")]
    CancelledByUser,
}

impl StreamError {
    /// Classify this error for reporting.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::CancelledByUser => FailureKind::Transport,
            Self::FrameParse { .. } | Self::FrameTooLarge { .. } => FailureKind::FrameParse,
            Self::Render(_) => FailureKind::Render,
        }
    }
}

/// Coarse failure category carried by `StreamOutcome::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection or read failure.
    Transport,
    /// Malformed event frame.
    FrameParse,
    /// Markup conversion failure.
    Render,
}

/// Reasons a submission is refused before anything is sent.
///
/// A refused submission never touches the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// A response is still streaming.
    #[error("a response is already streaming")]
    AlreadyStreaming,

    /// The input was empty after trimming.
    #[error("message is empty")]
    EmptyInput,

    /// No conversation has been selected.
    #[error("no conversation selected")]
    NoConversation,

    /// No model has been selected.
    #[error("no model selected")]
    NoModel,

    /// The session task has stopped.
    #[error("chat session closed")]
    SessionClosed,
}
