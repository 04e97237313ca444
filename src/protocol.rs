//! Wire types for the agent chat protocol and the REST bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat message exchanged between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Utc>,
    pub msg_id: Uuid,
    pub content: Vec<Content>,
}

/// One content item of a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Content {
    Text { text: String },
    StartSession,
    EndSession,
    /// Any content type this agent does not understand
    #[serde(other)]
    Unknown,
}

impl ChatMessage {
    /// A message carrying a single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            msg_id: Uuid::new_v4(),
            content: vec![Content::Text { text: text.into() }],
        }
    }

    /// Text items joined by newlines, or `None` when there are none.
    pub fn text_content(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|c| match c {
                Content::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Number of content items of unknown type.
    pub fn unknown_items(&self) -> usize {
        self.content
            .iter()
            .filter(|c| matches!(c, Content::Unknown))
            .count()
    }

    pub fn acknowledge(&self) -> ChatAcknowledgement {
        ChatAcknowledgement {
            timestamp: Utc::now(),
            acknowledged_msg_id: self.msg_id,
        }
    }
}

/// Receipt for a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAcknowledgement {
    pub timestamp: DateTime<Utc>,
    pub acknowledged_msg_id: Uuid,
}

/// Payload carried by an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Payload {
    ChatMessage(ChatMessage),
    ChatAcknowledgement(ChatAcknowledgement),
}

/// Addressed unit of delivery between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_version")]
    pub version: u32,
    pub sender: String,
    pub target: String,
    pub session: Uuid,
    pub payload: Payload,
}

fn default_version() -> u32 {
    1
}

impl Envelope {
    pub fn new(sender: impl Into<String>, target: impl Into<String>, payload: Payload) -> Self {
        Self {
            version: default_version(),
            sender: sender.into(),
            target: target.into(),
            session: Uuid::new_v4(),
            payload,
        }
    }
}

/// REST request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestRequest {
    pub text: String,
}

/// REST response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestResponse {
    /// Seconds since the epoch
    pub timestamp: i64,
    pub text: String,
    pub agent_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_content() {
        let msg = ChatMessage::text("Hello");
        assert_eq!(msg.text_content().as_deref(), Some("Hello"));
        assert_eq!(msg.unknown_items(), 0);
    }

    #[test]
    fn test_unknown_content_is_tolerated() {
        let raw = json!({
            "timestamp": "2025-01-01T00:00:00Z",
            "msg_id": "6f1c2a4e-8a0f-4b7e-9c43-3d9b1c4e2f10",
            "content": [
                {"type": "start-session"},
                {"type": "resource", "resource_id": "abc"},
                {"type": "text", "text": "hi"},
                {"type": "text", "text": "there"}
            ]
        });

        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.unknown_items(), 1);
        assert_eq!(msg.text_content().as_deref(), Some("hi\nthere"));
    }

    #[test]
    fn test_no_text_content() {
        let msg = ChatMessage {
            timestamp: Utc::now(),
            msg_id: Uuid::new_v4(),
            content: vec![Content::EndSession],
        };
        assert!(msg.text_content().is_none());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let msg = ChatMessage::text("ping");
        let envelope = Envelope::new("agent1qsender", "agent1qtarget", Payload::ChatMessage(msg));

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["payload"]["kind"], "chat_message");
        assert_eq!(value["payload"]["body"]["content"][0]["type"], "text");
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn test_acknowledge_references_message() {
        let msg = ChatMessage::text("ping");
        assert_eq!(msg.acknowledge().acknowledged_msg_id, msg.msg_id);
    }
}
