//! Message types for the conversation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(Error::InvalidMessage(format!("unrecognized role: {}", other))),
        }
    }
}

/// A recorded turn half. Only the message store constructs these, so a value
/// in hand always carries the index the store assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub sequence_index: u64,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub(crate) fn new(role: Role, content: String, sequence_index: u64) -> Self {
        Self {
            role,
            content,
            sequence_index,
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);

        let err = "system".parse::<Role>().unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");

        let bad: Result<Role, _> = serde_json::from_str("\"tool\"");
        assert!(bad.is_err());
    }
}
