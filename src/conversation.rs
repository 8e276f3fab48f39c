use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConversationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub is_streaming: bool,
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            is_streaming: false,
            is_error: false,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Empty assistant message that receives a reply while it streams in.
    pub fn placeholder() -> Self {
        Self { is_streaming: true, ..Self::new(Role::Assistant, String::new()) }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { is_error: true, ..Self::new(Role::Assistant, content.into()) }
    }

    /// The assistant is "typing": streaming but nothing to show yet.
    pub fn is_typing(&self) -> bool {
        self.role == Role::Assistant && self.is_streaming && self.content.is_empty()
    }
}

/// Ordered transcript. Only streaming messages may change.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self { messages: vec![Message::assistant(greeting)] }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_id(&self) -> Option<Uuid> {
        self.messages.last().map(|m| m.id)
    }

    #[cfg(test)]
    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn push(&mut self, message: Message) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Drops the transcript and starts over with a single greeting.
    pub fn reset(&mut self, greeting: impl Into<String>) {
        self.messages = vec![Message::assistant(greeting)];
    }

    pub fn replace_streaming_content(&mut self, id: Uuid, content: String) -> Result<(), ConversationError> {
        let msg = self.streaming_mut(id)?;
        msg.content = content;
        Ok(())
    }

    pub fn finalize(&mut self, id: Uuid) -> Result<(), ConversationError> {
        let msg = self.streaming_mut(id)?;
        msg.is_streaming = false;
        Ok(())
    }

    /// Finalizes a streaming message, dropping it when nothing arrived.
    pub fn abandon(&mut self, id: Uuid) -> Result<(), ConversationError> {
        let empty = self.streaming_mut(id)?.content.is_empty();
        if empty {
            self.messages.retain(|m| m.id != id);
            Ok(())
        } else {
            self.finalize(id)
        }
    }

    fn streaming_mut(&mut self, id: Uuid) -> Result<&mut Message, ConversationError> {
        let msg = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(ConversationError::UnknownMessage(id))?;
        if !msg.is_streaming {
            return Err(ConversationError::Finalized(id));
        }
        Ok(msg)
    }
}
