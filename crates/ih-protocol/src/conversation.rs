//! Conversation types for assistant requests.

use serde::{Deserialize, Serialize};

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Body of a chat-completion request: the whole conversation so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ConversationTurn>) -> Self {
        Self { messages }
    }
}

impl From<&[ConversationTurn]> for ChatRequest {
    fn from(turns: &[ConversationTurn]) -> Self {
        Self::new(turns.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_helpers() {
        let user = ConversationTurn::user("hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "hello");
        assert!(!user.is_assistant());

        let assistant = ConversationTurn::assistant("hi there");
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.is_assistant());
    }

    #[test]
    fn role_serialization() {
        let json = serde_json::to_string(&Role::User).unwrap();
        assert_eq!(json, "\"user\"");

        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn chat_request_wire_shape() {
        let turns = vec![
            ConversationTurn::user("I'm feeling anxious lately"),
            ConversationTurn::assistant("I'm here for you."),
        ];
        let request = ChatRequest::from(turns.as_slice());

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [
                    {"role": "user", "content": "I'm feeling anxious lately"},
                    {"role": "assistant", "content": "I'm here for you."}
                ]
            })
        );
    }

    #[test]
    fn turn_rejects_unknown_role() {
        let result: Result<ConversationTurn, _> =
            serde_json::from_str(r#"{"role":"system","content":"x"}"#);
        assert!(result.is_err());
    }
}
