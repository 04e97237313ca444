//! OpenAI Chat Completions client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::Result;
use crate::error::Error;
use super::{unavailable, BackendRequest, LlmClient, LlmResponse, Usage};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    client: Client,
}

impl OpenAiClient {
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

    fn build_body<'a>(&'a self, request: &'a BackendRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages,
        }
    }

    fn parse_response(&self, response: ChatResponse) -> Result<LlmResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::BackendUnavailable("OpenAI returned no choices".to_string()))?;

        let usage = response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: response.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable("openai", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::BackendUnavailable(format!(
                "OpenAI API error ({}): {}",
                status, text
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| unavailable("openai", e))?;
        self.parse_response(parsed)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
