//! CLI adapter - interactive and single-message command line interface.
//!
//! Talks to the same turn processor as the network channels, without a
//! directory or transport.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::agent::TurnProcessor;
use crate::ui;
use crate::Result;

/// CLI channel for local conversations.
pub struct CliChannel {
    processor: Arc<TurnProcessor>,
}

impl CliChannel {
    /// Create a new CLI channel.
    pub fn new(processor: Arc<TurnProcessor>) -> Self {
        Self { processor }
    }

    /// Run a single message and return the reply.
    pub async fn run_once(&self, message: &str) -> Result<String> {
        let spinner = ui::spinner("thinking");
        let result = self.processor.process_turn(message).await;
        spinner.finish_and_clear();
        result
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\x1b[1;34mYou\x1b[0m: ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
                println!("Goodbye! 👋");
                break;
            }

            match self.run_once(input).await {
                Ok(reply) => ui::print_reply("MirrorMind", &reply),
                Err(e) => ui::print_error(&e.to_string()),
            }
        }

        Ok(())
    }

    /// Number of messages recorded so far.
    pub fn history_len(&self) -> usize {
        self.processor.store().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::FakeLlmClient;
    use crate::agent::Context;

    #[tokio::test]
    async fn test_run_once_records_turn() {
        let processor = Arc::new(TurnProcessor::new(
            Arc::new(FakeLlmClient::new(vec!["Hello from the CLI"])),
            Context::default(),
        ));
        let cli = CliChannel::new(processor);

        let reply = cli.run_once("Hello").await.unwrap();
        assert_eq!(reply, "Hello from the CLI");
        assert_eq!(cli.history_len(), 2);
    }
}
