//! Turn processor - one user input in, one assistant reply out

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::Result;

use super::context::Context;
use super::llm::LlmClient;
use super::message::{ConversationMessage, Role};
use super::store::MessageStore;

/// Owns one conversation and serializes the turns played against it.
pub struct TurnProcessor {
    store: MessageStore,
    client: Arc<dyn LlmClient>,
    context: Context,
    /// Held for the whole append/generate/append sequence.
    turn_lock: Mutex<()>,
}

impl TurnProcessor {
    /// Create a processor with an empty conversation.
    pub fn new(client: Arc<dyn LlmClient>, context: Context) -> Self {
        Self {
            store: MessageStore::new(),
            client,
            context,
            turn_lock: Mutex::new(()),
        }
    }

    /// Play one turn and return the assistant's reply.
    ///
    /// The user message is recorded before the backend is called and stays
    /// recorded if the backend fails; in that case no assistant message is
    /// appended and the error is returned as-is.
    pub async fn process_turn(&self, input: &str) -> Result<String> {
        if input.trim().is_empty() {
            return Err(Error::InvalidMessage("input text is empty".to_string()));
        }

        let _guard = self.turn_lock.lock().await;

        let index = self.store.append(Role::User, input)?;
        debug!(index, "user message recorded");

        let snapshot = self.store.snapshot();
        let request = self.context.build_request(&snapshot);

        let response = match self.client.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(index, provider = self.client.provider(), "turn failed: {}", e);
                return Err(e);
            }
        };

        if response.content.trim().is_empty() {
            error!(index, provider = self.client.provider(), "backend returned an empty completion");
            return Err(Error::BackendUnavailable(format!(
                "{} returned an empty completion",
                self.client.provider()
            )));
        }

        let reply_index = self.store.append(Role::Assistant, response.content.clone())?;
        info!(
            index = reply_index,
            model = %response.model,
            tokens = response.usage.total_tokens,
            "turn completed with {} chars",
            response.content.len()
        );

        Ok(response.content)
    }

    /// Snapshot of the conversation so far.
    pub fn history(&self) -> Vec<ConversationMessage> {
        self.store.snapshot()
    }

    /// Number of completed turns.
    pub fn turns(&self) -> usize {
        self.store
            .snapshot()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use std::time::Duration;

    fn processor(client: FakeLlmClient) -> (Arc<FakeLlmClient>, TurnProcessor) {
        let client = Arc::new(client);
        let processor = TurnProcessor::new(client.clone(), Context::default());
        (client, processor)
    }

    #[tokio::test]
    async fn test_hello_on_empty_conversation() {
        let (_, processor) = processor(FakeLlmClient::new(vec!["Hello, human!"]));

        let reply = processor.process_turn("Hello").await.unwrap();
        assert_eq!(reply, "Hello, human!");

        let history = processor.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[0].sequence_index, 0);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello, human!");
        assert_eq!(history[1].sequence_index, 1);
    }

    #[tokio::test]
    async fn test_successful_turns_alternate() {
        let (client, processor) = processor(FakeLlmClient::new(vec!["a", "b", "c", "d"]));

        for i in 0..4 {
            processor.process_turn(&format!("q{}", i)).await.unwrap();
        }

        let history = processor.history();
        assert_eq!(history.len(), 8);
        assert_eq!(processor.turns(), 4);
        for (i, msg) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(msg.role, expected);
            assert_eq!(msg.sequence_index, i as u64);
        }

        // The backend always sees the whole conversation ending in the new input.
        let last = client.requests().pop().unwrap();
        assert_eq!(last.messages.len(), 7);
        assert_eq!(last.messages.last().unwrap().content, "q3");
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_user_message() {
        let script = vec![Some("one".to_string()), Some("two".to_string()), None];
        let (_, processor) = processor(FakeLlmClient::scripted(script));

        processor.process_turn("first").await.unwrap();
        processor.process_turn("second").await.unwrap();
        let err = processor.process_turn("third").await.unwrap_err();

        assert!(matches!(err, Error::BackendUnavailable(_)));
        // 2(K-1)+1 with K = 3
        let history = processor.history();
        assert_eq!(history.len(), 5);
        assert_eq!(history[4].role, Role::User);
        assert_eq!(history[4].content, "third");
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_append() {
        let (client, processor) = processor(FakeLlmClient::new(vec!["unused"]));

        let err = processor.process_turn("  ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
        assert!(processor.store().is_empty());
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_completion_is_a_failure() {
        let (_, processor) = processor(FakeLlmClient::new(vec![""]));

        let err = processor.process_turn("Hello").await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert_eq!(processor.history().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_turns_do_not_interleave() {
        let replies: Vec<Option<String>> = (0..10).map(|i| Some(format!("r{}", i))).collect();
        let client = FakeLlmClient::scripted(replies).with_delay(Duration::from_millis(5));
        let (_, processor) = processor(client);
        let processor = Arc::new(processor);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let processor = processor.clone();
                tokio::spawn(async move { processor.process_turn(&format!("u{}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let history = processor.history();
        assert_eq!(history.len(), 20);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].sequence_index, pair[0].sequence_index + 1);
        }

        let mut users: Vec<_> = history
            .iter()
            .filter(|m| m.is_user())
            .map(|m| m.content.clone())
            .collect();
        users.sort();
        users.dedup();
        assert_eq!(users.len(), 10);
    }

    #[tokio::test]
    async fn test_separate_processors_are_independent() {
        let (_, first) = processor(FakeLlmClient::new(vec!["from first"]));
        let (_, second) = processor(FakeLlmClient::new(vec!["from second"]));

        let (a, b) = tokio::join!(first.process_turn("hi"), second.process_turn("hey"));
        assert_eq!(a.unwrap(), "from first");
        assert_eq!(b.unwrap(), "from second");
        assert_eq!(first.history().len(), 2);
        assert_eq!(second.history()[0].content, "hey");
    }
}
