use serde::{Deserialize, Serialize};

use super::role::Role;

/// A single entry of the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Message {
            role,
            content: content.into(),
        }
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Content of the most recent user message, or an empty string
pub fn last_user_content(history: &[Message]) -> &str {
    history
        .iter()
        .rev()
        .find(|m| m.is_user())
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}
