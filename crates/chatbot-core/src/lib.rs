//! Core types for the chatbot client.
//!
//! This crate provides the values shared by the streaming pipeline, the
//! backend REST client and the terminal front end:
//!
//! - **Identifiers**: `MessageId`, `ConversationId`, `UserId`
//! - **Wire types**: `Message`, `ChatRequest`, `Conversation`, `AiModel`, files
//! - **Error types**: `CoreError`
//!
//! # Example
//!
//! ```
//! use chatbot_core::{AiModel, ChatRequest, ConversationId, User};
//!
//! let user = User::new("u-1", "alice", "user").unwrap();
//! let model = AiModel {
//!     model: "ollama".to_string(),
//!     model_name: "mistral".to_string(),
//!     display_name: "Ollama - Mistral".to_string(),
//!     description: String::new(),
//! };
//! let conversation = ConversationId::new("c-1").unwrap();
//!
//! let request = ChatRequest::new(&user, conversation, &model, "Hello", Vec::new());
//! assert_eq!(request.model_name(), "mistral");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;

pub use error::{CoreError, Result};
pub use ids::{ConversationId, IdError, MessageId, UserId};
pub use types::{
    now_timestamp, AiModel, ChatHistoryEntry, ChatRequest, Conversation, FileEntry, FileGroup,
    Message, Role, User,
};
