//! Stream lifecycle and cancellation.
//!
//! `Idle -> Streaming -> {Completed, Cancelled, Failed}`. Every terminal
//! transition re-arms a fresh cancellation token, so a cancel aimed at one
//! response can never leak into the next.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{FailureKind, SubmitError};

/// Terminal content written when the user cancels.
pub const CANCELLED_MESSAGE: &str = "You have cancelled the request!";

/// Terminal content written on any stream failure.
pub const FAILURE_MESSAGE: &str =
    "An error occurred while processing your request. Please try again!";

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server closed the stream normally.
    Completed,
    /// The user cancelled.
    Cancelled,
    /// The stream failed.
    Failed(FailureKind),
}

impl StreamOutcome {
    /// Terminal transcript content for this outcome, if any.
    #[must_use]
    pub const fn terminal_message(self) -> Option<&'static str> {
        match self {
            Self::Completed => None,
            Self::Cancelled => Some(CANCELLED_MESSAGE),
            Self::Failed(_) => Some(FAILURE_MESSAGE),
        }
    }
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream has run yet.
    Idle,
    /// A response is streaming.
    Streaming,
    /// The last stream completed.
    Completed,
    /// The last stream was cancelled.
    Cancelled,
    /// The last stream failed.
    Failed(FailureKind),
}

impl From<StreamOutcome> for StreamState {
    fn from(outcome: StreamOutcome) -> Self {
        match outcome {
            StreamOutcome::Completed => Self::Completed,
            StreamOutcome::Cancelled => Self::Cancelled,
            StreamOutcome::Failed(kind) => Self::Failed(kind),
        }
    }
}

#[derive(Debug)]
struct Slot {
    token: CancellationToken,
    responding: bool,
}

/// Owns the in-flight flag and the current cancellation token.
#[derive(Debug)]
pub struct StreamController {
    state: StreamState,
    slot: Arc<Mutex<Slot>>,
}

impl StreamController {
    /// Create an idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            slot: Arc::new(Mutex::new(Slot {
                token: CancellationToken::new(),
                responding: false,
            })),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Whether a response is streaming.
    #[must_use]
    pub fn is_responding(&self) -> bool {
        self.slot.lock().responding
    }

    /// A handle that can cancel the current stream from another task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Enter `Streaming` and return the token for this stream.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::AlreadyStreaming` if a stream is in flight.
    pub fn begin(&mut self) -> Result<CancellationToken, SubmitError> {
        let mut slot = self.slot.lock();
        if slot.responding {
            return Err(SubmitError::AlreadyStreaming);
        }
        slot.responding = true;
        self.state = StreamState::Streaming;
        Ok(slot.token.clone())
    }

    /// Record the terminal outcome and re-arm a fresh token.
    pub fn finish(&mut self, outcome: StreamOutcome) {
        let mut slot = self.slot.lock();
        slot.token = CancellationToken::new();
        slot.responding = false;
        self.state = outcome.into();
    }
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable cancel trigger for the current stream.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    slot: Arc<Mutex<Slot>>,
}

impl CancelHandle {
    /// Cancel the in-flight stream.
    ///
    /// Returns `false` (and does nothing) when no stream is in flight.
    pub fn cancel(&self) -> bool {
        let slot = self.slot.lock();
        if !slot.responding {
            return false;
        }
        slot.token.cancel();
        true
    }

    /// Whether a response is streaming.
    #[must_use]
    pub fn is_responding(&self) -> bool {
        self.slot.lock().responding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_enters_streaming() {
        let mut controller = StreamController::new();
        assert_eq!(controller.state(), StreamState::Idle);

        let token = controller.begin().unwrap();
        assert!(!token.is_cancelled());
        assert_eq!(controller.state(), StreamState::Streaming);
        assert!(controller.is_responding());
    }

    #[test]
    fn second_begin_is_rejected() {
        let mut controller = StreamController::new();
        controller.begin().unwrap();
        assert!(matches!(
            controller.begin(),
            Err(SubmitError::AlreadyStreaming)
        ));
    }

    #[test]
    fn cancel_fires_current_token() {
        let mut controller = StreamController::new();
        let handle = controller.cancel_handle();
        let token = controller.begin().unwrap();

        assert!(handle.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_while_idle_is_noop() {
        let mut controller = StreamController::new();
        let handle = controller.cancel_handle();

        assert!(!handle.cancel());
        let token = controller.begin().unwrap();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn finish_rearms_fresh_token() {
        let mut controller = StreamController::new();
        let handle = controller.cancel_handle();
        let first = controller.begin().unwrap();
        handle.cancel();
        controller.finish(StreamOutcome::Cancelled);

        assert_eq!(controller.state(), StreamState::Cancelled);
        assert!(!handle.is_responding());

        let second = controller.begin().unwrap();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn failure_state_keeps_kind() {
        let mut controller = StreamController::new();
        controller.begin().unwrap();
        controller.finish(StreamOutcome::Failed(FailureKind::FrameParse));
        assert_eq!(
            controller.state(),
            StreamState::Failed(FailureKind::FrameParse)
        );
    }

    #[test]
    fn terminal_messages() {
        assert_eq!(StreamOutcome::Completed.terminal_message(), None);
        assert_eq!(
            StreamOutcome::Cancelled.terminal_message(),
            Some(CANCELLED_MESSAGE)
        );
        assert_eq!(
            StreamOutcome::Failed(FailureKind::Transport).terminal_message(),
            Some(FAILURE_MESSAGE)
        );
    }
}
