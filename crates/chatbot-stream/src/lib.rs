//! Streaming chat-response pipeline.
//!
//! A submission flows through five stages:
//!
//! - **Transport**: cancellable `POST /chat`, yielding the raw body
//! - **Frame decoder**: `data: {...}` lines reassembled across reads
//! - **Renderer**: accumulated Markdown to sanitized HTML on every frame
//! - **Transcript**: user message appended, assistant reply merged in place
//! - **Controller**: in-flight flag, cancellation token, terminal outcome
//!
//! [`ChatPipeline`] runs one submission at a time; [`ChatSession`] moves it
//! into a task and exposes it over channels.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatbot_core::User;
//! use chatbot_stream::{ChatPipeline, ChatSession, HttpTransport, MarkdownRenderer, StreamConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StreamConfig::default();
//! let transport = Arc::new(HttpTransport::new("http://localhost:8000", &config));
//! let renderer = Arc::new(MarkdownRenderer::new(config.max_render_bytes));
//! let user = User::new("u-1", "alice", "user")?;
//!
//! let (pipeline, mut events) = ChatPipeline::new(transport, renderer, user, &config);
//! let (session, _task) = ChatSession::spawn(pipeline);
//!
//! session.submit("Hello").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod transcript;
pub mod transport;

pub use config::StreamConfig;
pub use controller::{
    CancelHandle, StreamController, StreamOutcome, StreamState, CANCELLED_MESSAGE, FAILURE_MESSAGE,
};
pub use decoder::{FrameDecoder, StreamFrame};
pub use error::{FailureKind, Result, StreamError, SubmitError};
pub use pipeline::{ChatPipeline, TranscriptEvent};
pub use render::{ContentRenderer, MarkdownRenderer};
pub use session::{ChatSession, SessionCommand, SessionHandle};
pub use transcript::Transcript;
pub use transport::{ByteStream, HttpTransport, Transport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{ScriptedTransport, ScriptedWriter};
