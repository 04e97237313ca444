//! MirrorMind - a conversational agent backed by a hosted LLM
//!
//! This library provides the conversation core (message store, turn
//! processor, LLM backends) and the agent surfaces around it: identity,
//! directory registration, peer transport and the HTTP/CLI channels.

pub mod adapters;
pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod transport;
pub mod ui;

pub use error::{Error, Result};
