//! Append-only conversation log.

use std::sync::RwLock;

use crate::error::Error;
use crate::Result;

use super::message::{ConversationMessage, Role};

/// Ordered, append-only log of conversation turns.
///
/// Appends take the write lock once, so a message is either fully recorded
/// with its index or not recorded at all. Snapshots clone under the read lock
/// and can be iterated while further appends happen.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: RwLock<Vec<ConversationMessage>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and return its sequence index.
    pub fn append(&self, role: Role, content: impl Into<String>) -> Result<u64> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidMessage(format!(
                "{} message content is empty",
                role
            )));
        }

        let mut messages = self
            .messages
            .write()
            .map_err(|_| Error::Other("message store lock poisoned".to_string()))?;

        let index = messages.len() as u64;
        messages.push(ConversationMessage::new(role, content, index));
        Ok(index)
    }

    /// Read-only copy of the log in insertion order.
    pub fn snapshot(&self) -> Vec<ConversationMessage> {
        match self.messages.read() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.messages.read() {
            Ok(messages) => messages.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<ConversationMessage> {
        match self.messages.read() {
            Ok(messages) => messages.last().cloned(),
            Err(poisoned) => poisoned.into_inner().last().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_append_assigns_indices() {
        let store = MessageStore::new();
        assert!(store.is_empty());

        assert_eq!(store.append(Role::User, "Hello").unwrap(), 0);
        assert_eq!(store.append(Role::Assistant, "Hi!").unwrap(), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].role, Role::User);
        assert_eq!(snapshot[0].content, "Hello");
        assert_eq!(snapshot[1].sequence_index, 1);
        assert_eq!(store.last().unwrap().content, "Hi!");
    }

    #[test]
    fn test_rejects_empty_content() {
        let store = MessageStore::new();

        let err = store.append(Role::User, "   ").unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = MessageStore::new();
        store.append(Role::User, "first").unwrap();

        let snapshot = store.snapshot();
        store.append(Role::Assistant, "second").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_appends_unique_indices() {
        let store = Arc::new(MessageStore::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(Role::User, format!("t{} m{}", t, i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 400);
        for (i, msg) in snapshot.iter().enumerate() {
            assert_eq!(msg.sequence_index, i as u64);
        }
    }
}
