//! Agent module - core conversation logic.
//!
//! This module contains:
//! - Message types (ConversationMessage, Role)
//! - The append-only message store
//! - LLM client trait and implementations
//! - Turn processor for handling one input at a time
//! - Context builder for backend requests
//!
//! # Adding a New LLM Provider
//!
//! See [`llm`] for instructions.

mod context;
mod message;
mod store;
mod turn;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::{Context, MAX_HISTORY_MESSAGES};
pub use llm::{BackendRequest, LlmClient, LlmResponse, ProviderRegistry, Usage};
pub use message::{ConversationMessage, Role};
pub use store::MessageStore;
pub use turn::TurnProcessor;
