//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::{unavailable, BackendRequest, LlmClient, LlmResponse, Usage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Anthropic API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens: 4096,
            client: Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_body<'a>(&'a self, request: &'a BackendRequest) -> CreateMessageRequest<'a> {
        CreateMessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: request.system.as_deref(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        }
    }

    fn parse_response(response: CreateMessageResponse) -> LlmResponse {
        let content: String = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            model: response.model,
            usage,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable("anthropic", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|wrapper| wrapper.error.message)
                .unwrap_or(text);
            return Err(Error::BackendUnavailable(format!(
                "Anthropic API error ({}): {}",
                status, message
            )));
        }

        let parsed: CreateMessageResponse = response
            .json()
            .await
            .map_err(|e| unavailable("anthropic", e))?;
        Ok(Self::parse_response(parsed))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "anthropic"
    }
}

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CreateMessageResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}
