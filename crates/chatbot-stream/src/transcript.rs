//! Ordered message list for one conversation.

use chatbot_core::{ConversationId, Message, MessageId, UserId};

/// The conversation transcript.
///
/// Only the most recent assistant message is ever mutated; everything
/// before it is immutable history.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    conversation_id: Option<ConversationId>,
    user_id: UserId,
}

impl Transcript {
    /// Create an empty transcript owned by `user_id`.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            messages: Vec::new(),
            conversation_id: None,
            user_id,
        }
    }

    /// Conversation the transcript currently shows.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Swap in a loaded conversation, discarding the current messages.
    pub fn replace_history(&mut self, conversation_id: ConversationId, messages: Vec<Message>) {
        self.conversation_id = Some(conversation_id);
        self.messages = messages;
    }

    /// Append a user message and return its id.
    pub fn append_user_message(&mut self, conversation_id: &ConversationId, text: &str) -> MessageId {
        let message = Message::user(conversation_id.clone(), self.user_id.clone(), text);
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Merge a rendered update into the in-flight assistant message.
    ///
    /// Replaces content and error flag of the last message when it is an
    /// assistant message; otherwise appends a new assistant message.
    pub fn apply_assistant_update(
        &mut self,
        conversation_id: &ConversationId,
        markup: String,
        is_error: bool,
    ) -> &Message {
        match self.messages.last_mut() {
            Some(last) if last.is_assistant() => {
                last.content = markup;
                last.is_error = is_error;
            }
            _ => {
                self.messages.push(Message::assistant(
                    conversation_id.clone(),
                    self.user_id.clone(),
                    markup,
                    is_error,
                ));
            }
        }
        &self.messages[self.messages.len() - 1]
    }

    /// All messages in append order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
