//! HTTP client for the backend REST API.
//!
//! Covers the collaborator endpoints around the chat stream: models,
//! conversations, histories and files. The stream itself lives in
//! `chatbot-stream`.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;

use chatbot_core::{AiModel, Conversation, ConversationId, FileEntry, FileGroup, Message, UserId};

use crate::config::ApiConfig;
use crate::error::{ApiErrorResponse, ClientError, Result};

/// Client for the backend REST API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, &config.base_url)
    }

    /// Create a client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.message(),
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    /// Check the status and decode a JSON body.
    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// List the models the backend can answer with.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be parsed.
    pub async fn get_ai_models(&self) -> Result<Vec<AiModel>> {
        let url = format!("{}/ai-models", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// List a user's conversations.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be parsed.
    pub async fn list_conversations(&self, user_id: &UserId) -> Result<Vec<Conversation>> {
        let url = format!("{}/chat-histories/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    /// Create a new, empty conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be parsed.
    pub async fn new_conversation(&self, user_id: &UserId) -> Result<Conversation> {
        let url = format!("{}/new-conversation/{}", self.base_url, user_id);
        let response = self.client.post(&url).send().await?;
        let conversation: Conversation = Self::read_json(response).await?;

        tracing::debug!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    /// Load the messages of one conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be parsed.
    pub async fn get_chat_history(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>> {
        let url = format!(
            "{}/chat-histories/{}/{}",
            self.base_url, user_id, conversation_id
        );
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// List the files visible to a user, grouped by owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be parsed.
    pub async fn list_files(&self, user_id: &UserId) -> Result<Vec<FileGroup>> {
        let url = format!("{}/files/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    /// Upload files readable by `allowed_roles`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if a file cannot be read, and an HTTP or
    /// API error if the upload fails.
    pub async fn upload_files(
        &self,
        user_id: &UserId,
        paths: &[PathBuf],
        allowed_roles: &[String],
    ) -> Result<Vec<FileEntry>> {
        let mut form = Form::new();
        for path in paths {
            form = form.part("files", file_part(path).await?);
        }
        for role in allowed_roles {
            form = form.text("allowed_roles", role.clone());
        }

        let url = format!("{}/upload/{}", self.base_url, user_id);
        tracing::debug!(url = %url, files = paths.len(), "Uploading files");

        let response = self.client.post(&url).multipart(form).send().await?;
        Self::read_json(response).await
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

    Ok(Part::bytes(data).file_name(file_name))
}
