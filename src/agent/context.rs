//! Context builder for backend requests.
//!
//! - System prompt rendered once at construction
//! - History windowing (max N messages, suffix always opens on a user turn)

use crate::config::Config;

use super::llm::BackendRequest;
use super::message::{ConversationMessage, Role};

/// Default maximum history messages sent to the backend.
pub const MAX_HISTORY_MESSAGES: usize = 40;

/// Turns a conversation snapshot into a backend request.
#[derive(Debug, Clone)]
pub struct Context {
    system_prompt: Option<String>,
    history_window: usize,
}

impl Context {
    /// Create a context from configuration.
    pub fn new(config: &Config) -> Self {
        let system_prompt = config
            .llm
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(&config.agent.name, &config.agent.description));

        Self {
            system_prompt: Some(system_prompt),
            history_window: config.llm.history_window.max(1),
        }
    }

    /// Context without a system prompt.
    pub fn bare(history_window: usize) -> Self {
        Self {
            system_prompt: None,
            history_window: history_window.max(1),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Build the request for the backend from a snapshot.
    pub fn build_request(&self, snapshot: &[ConversationMessage]) -> BackendRequest {
        let mut start = snapshot.len().saturating_sub(self.history_window);

        // Providers expect the conversation to open with a user message.
        while start < snapshot.len() && snapshot[start].role != Role::User {
            start += 1;
        }

        BackendRequest {
            system: self.system_prompt.clone(),
            messages: snapshot[start..].to_vec(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::bare(MAX_HISTORY_MESSAGES)
    }
}

fn default_system_prompt(name: &str, description: &str) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");
    format!(
        "You are {}, a conversational agent reachable by people and by other agents.\n\
         {}\n\n\
         Session started: {}\n\n\
         Answer helpfully and concisely. Messages may come from another agent \
         relaying a user; reply to the content, not the relay.",
        name, description, now
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::MessageStore;

    fn conversation(turns: usize) -> Vec<ConversationMessage> {
        let store = MessageStore::new();
        for i in 0..turns {
            store.append(Role::User, format!("Question {}", i)).unwrap();
            store.append(Role::Assistant, format!("Answer {}", i)).unwrap();
        }
        store.snapshot()
    }

    #[test]
    fn test_system_prompt_mentions_agent() {
        let mut config = Config::default();
        config.agent.name = "mirror_mind_beta".into();

        let ctx = Context::new(&config);
        assert!(ctx.system_prompt().unwrap().contains("mirror_mind_beta"));
    }

    #[test]
    fn test_configured_system_prompt_wins() {
        let mut config = Config::default();
        config.llm.system_prompt = Some("Only answer in haiku.".into());

        let request = Context::new(&config).build_request(&conversation(1));
        assert_eq!(request.system.as_deref(), Some("Only answer in haiku."));
    }

    #[test]
    fn test_short_history_passes_through() {
        let snapshot = conversation(2);
        let request = Context::bare(10).build_request(&snapshot);
        assert_eq!(request.messages, snapshot);
        assert!(request.system.is_none());
    }

    #[test]
    fn test_history_windowing() {
        let snapshot = conversation(50);
        let request = Context::bare(MAX_HISTORY_MESSAGES).build_request(&snapshot);

        assert_eq!(request.messages.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(request.messages[0].role, Role::User);
        assert!(request.messages.last().unwrap().content.contains("49"));
    }

    #[test]
    fn test_window_skips_leading_assistant() {
        // Odd window would start on an assistant message.
        let request = Context::bare(3).build_request(&conversation(3));

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "Question 2");
    }
}
