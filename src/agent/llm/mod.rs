//! LLM backend abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] selecting one provider at startup from the
//!   credentials in [`LlmConfig`]
//! - [`TimeoutClient`] bounding every backend call
//! - Concrete implementations: Anthropic, OpenAI, Gemini
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `mistral.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add a [`BackendFactory`] variant and place it in `PRECEDENCE`
//! 4. Add the credential field in `config.rs`

mod types;

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::Error;
use crate::Result;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use super::message::ConversationMessage;

/// What a backend is asked to continue: an optional system prompt and the
/// (possibly windowed) conversation.
#[derive(Debug, Clone, Default)]
pub struct BackendRequest {
    pub system: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Completion text.
    pub content: String,

    /// Model that produced the completion, as reported by the provider.
    pub model: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
            usage: Usage::default(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// LLM client trait - swappable provider abstraction.
///
/// One call yields exactly one response or one error.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate the next assistant message.
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse>;

    /// Model requests are sent to.
    fn model(&self) -> &str;

    /// Provider name ("anthropic", "openai", ...).
    fn provider(&self) -> &str;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse> {
        (**self).generate(request).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    fn provider(&self) -> &str {
        (**self).provider()
    }
}

/// Bounds a backend call. Expiry is reported as [`Error::BackendUnavailable`].
pub struct TimeoutClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C: LlmClient> TimeoutClient<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for TimeoutClient<C> {
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse> {
        match tokio::time::timeout(self.timeout, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::BackendUnavailable(format!(
                "{} did not answer within {}s",
                self.inner.provider(),
                self.timeout.as_secs_f32()
            ))),
        }
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn provider(&self) -> &str {
        self.inner.provider()
    }
}

/// Outcome of trying one factory.
pub enum Selection {
    Ready(Box<dyn LlmClient>),
    Unavailable(String),
}

/// One way of building a backend from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFactory {
    Anthropic,
    OpenAi,
    Gemini,
}

impl BackendFactory {
    /// Order in which credentials are tried; first available wins.
    pub const PRECEDENCE: [BackendFactory; 3] = [
        BackendFactory::Anthropic,
        BackendFactory::OpenAi,
        BackendFactory::Gemini,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackendFactory::Anthropic => "anthropic",
            BackendFactory::OpenAi => "openai",
            BackendFactory::Gemini => "gemini",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::PRECEDENCE
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn try_build(&self, config: &LlmConfig) -> Selection {
        let model = config.model.as_deref();
        match self {
            BackendFactory::Anthropic => {
                if config.anthropic_api_key.is_empty() {
                    return Selection::Unavailable("ANTHROPIC_API_KEY not set".to_string());
                }
                let client = AnthropicClient::new(
                    &config.anthropic_api_key,
                    model.unwrap_or(anthropic::DEFAULT_MODEL),
                )
                .with_max_tokens(config.max_tokens);
                Selection::Ready(Box::new(client))
            }
            BackendFactory::OpenAi => {
                if config.openai_api_key.is_empty() {
                    return Selection::Unavailable("OPENAI_API_KEY not set".to_string());
                }
                let client = OpenAiClient::new(
                    &config.openai_api_key,
                    model.unwrap_or(openai::DEFAULT_MODEL),
                )
                .with_max_tokens(config.max_tokens);
                Selection::Ready(Box::new(client))
            }
            BackendFactory::Gemini => {
                if config.gemini_api_key.is_empty() {
                    return Selection::Unavailable("GEMINI_API_KEY not set".to_string());
                }
                let client = GeminiClient::new(
                    &config.gemini_api_key,
                    model.unwrap_or(gemini::DEFAULT_MODEL),
                )
                .with_max_tokens(config.max_tokens);
                Selection::Ready(Box::new(client))
            }
        }
    }
}

/// Provider registry - selects the LLM backend once at startup.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry::select(&config.llm)?;
/// let response = client.generate(&request).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Pick a backend by walking [`BackendFactory::PRECEDENCE`], or only the
    /// pinned provider when `config.provider` is set.
    pub fn select(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
        let candidates: Vec<BackendFactory> = match config.provider.as_deref() {
            Some(name) => {
                let factory = BackendFactory::from_name(name).ok_or_else(|| {
                    Error::NoBackendConfigured(format!("unknown provider: {}", name))
                })?;
                vec![factory]
            }
            None => BackendFactory::PRECEDENCE.to_vec(),
        };

        let mut reasons = Vec::with_capacity(candidates.len());
        for factory in candidates {
            match factory.try_build(config) {
                Selection::Ready(client) => {
                    info!(provider = factory.name(), model = client.model(), "LLM backend selected");
                    let timeout = Duration::from_secs(config.timeout_secs.max(1));
                    return Ok(Arc::new(TimeoutClient::new(client, timeout)));
                }
                Selection::Unavailable(reason) => {
                    debug!(provider = factory.name(), %reason, "backend unavailable");
                    reasons.push(format!("{}: {}", factory.name(), reason));
                }
            }
        }

        Err(Error::NoBackendConfigured(reasons.join("; ")))
    }

    /// Status of every provider, in precedence order.
    pub fn describe(config: &LlmConfig) -> Vec<(&'static str, bool)> {
        BackendFactory::PRECEDENCE
            .iter()
            .map(|f| (f.name(), matches!(f.try_build(config), Selection::Ready(_))))
            .collect()
    }
}

/// Map a reqwest failure to a backend outage. The URL is stripped so that
/// query-string credentials never reach logs or HTTP callers.
pub(crate) fn unavailable(provider: &str, err: reqwest::Error) -> Error {
    Error::BackendUnavailable(format!("{} request failed: {}", provider, err.without_url()))
}

/// Scripted LLM client for testing.
#[cfg(test)]
pub(crate) struct FakeLlmClient {
    script: std::sync::Mutex<std::collections::VecDeque<Option<String>>>,
    requests: std::sync::Mutex<Vec<BackendRequest>>,
    delay: Option<Duration>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Answer with the given texts in order.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.into_iter().map(|s| Some(s.to_string())).collect())
    }

    /// `None` entries fail with `BackendUnavailable`.
    pub fn scripted(script: Vec<Option<String>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into()),
            requests: std::sync::Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing() -> Self {
        Self::scripted(vec![])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(text)) => Ok(LlmResponse {
                content: text,
                model: "fake-model".to_string(),
                usage: Usage::default(),
            }),
            _ => Err(Error::BackendUnavailable("fake backend is down".to_string())),
        }
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    fn provider(&self) -> &str {
        "fake"
    }
}
