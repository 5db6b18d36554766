//! REST client for the chatbot backend.
//!
//! The chat stream is handled by `chatbot-stream`; this crate covers the
//! surrounding endpoints a client needs to pick a model, list and create
//! conversations, load history, and manage uploaded files.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod error;

pub use client::BackendClient;
pub use config::ApiConfig;
pub use error::{ClientError, Result};
