//! Conversation list.
//!
//! Owns the user's conversations and tells the chat session which one to
//! show by sending `SelectConversation` over the session's command channel.

use tokio::sync::mpsc;

use chatbot_api::{BackendClient, ClientError};
use chatbot_core::{Conversation, ConversationId, UserId};
use chatbot_stream::SessionCommand;

/// Errors from sidebar actions.
#[derive(Debug, thiserror::Error)]
pub enum SidebarError {
    /// Backend call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// No conversation at that position.
    #[error("there is no conversation {}", .0 + 1)]
    NoSuchConversation(usize),

    /// The chat session has stopped.
    #[error("chat session closed")]
    SessionClosed,
}

/// The conversation list for one user.
pub struct Sidebar {
    client: BackendClient,
    user_id: UserId,
    conversations: Vec<Conversation>,
    selected: Option<usize>,
    session: mpsc::Sender<SessionCommand>,
}

impl Sidebar {
    /// Create an empty sidebar that drives `session`.
    pub fn new(
        client: BackendClient,
        user_id: UserId,
        session: mpsc::Sender<SessionCommand>,
    ) -> Self {
        Self {
            client,
            user_id,
            conversations: Vec::new(),
            selected: None,
            session,
        }
    }

    /// Conversations in display order.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Position of the open conversation.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Reload the list from the backend.
    pub async fn refresh(&mut self) -> Result<(), SidebarError> {
        let current = self.current_id();
        self.conversations = self.client.list_conversations(&self.user_id).await?;
        self.selected = current.and_then(|id| self.conversations.iter().position(|c| c.id == id));
        tracing::debug!(count = self.conversations.len(), "Loaded conversations");
        Ok(())
    }

    /// Create a conversation, put it on top and open it.
    pub async fn new_conversation(&mut self) -> Result<(), SidebarError> {
        let conversation = self.client.new_conversation(&self.user_id).await?;
        self.conversations.insert(0, conversation);
        self.select(0).await
    }

    /// Load the history of conversation `index` and open it.
    pub async fn select(&mut self, index: usize) -> Result<(), SidebarError> {
        let conversation = self
            .conversations
            .get(index)
            .ok_or(SidebarError::NoSuchConversation(index))?;
        let history = self
            .client
            .get_chat_history(&self.user_id, &conversation.id)
            .await?;

        self.session
            .send(SessionCommand::SelectConversation {
                conversation_id: conversation.id.clone(),
                history,
            })
            .await
            .map_err(|_| SidebarError::SessionClosed)?;
        self.selected = Some(index);
        Ok(())
    }

    fn current_id(&self) -> Option<ConversationId> {
        self.selected
            .and_then(|i| self.conversations.get(i))
            .map(|c| c.id.clone())
    }
}
