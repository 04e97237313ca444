//! Gemini LLM client implementation

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use crate::Result;
use crate::error::Error;
use super::types::GeminiResponse;
use super::{unavailable, BackendRequest, LlmClient, LlmResponse, Usage};
use crate::agent::message::Role;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/";

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_API_URL.to_string(),
            max_tokens: 8192,
            client: Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Point the client at another models endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The key travels in the `x-goog-api-key` header, never in the URL.
    fn build_url(&self) -> String {
        format!("{}{}:generateContent", self.base_url, self.model)
    }

    fn build_body(&self, request: &BackendRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({
                    "role": role,
                    "parts": [{"text": m.content}]
                })
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": self.max_tokens
            }
        });

        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        body
    }

    fn parse_response(&self, response: GeminiResponse) -> Result<LlmResponse> {
        let candidate = response.candidates.into_iter().next()
            .ok_or_else(|| Error::BackendUnavailable("Gemini returned no candidates".to_string()))?;

        if let Some(reason) = &candidate.finish_reason {
            debug!(%reason, "gemini finished");
        }

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let usage = response.usage_metadata
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count.unwrap_or(0),
                completion_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: response.model_version.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: &BackendRequest) -> Result<LlmResponse> {
        let body = self.build_body(request);

        let response = self.client
            .post(self.build_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| unavailable("gemini", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::BackendUnavailable(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| unavailable("gemini", e))?;
        self.parse_response(gemini_response)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::MessageStore;

    #[test]
    fn test_build_body_maps_roles() {
        let store = MessageStore::new();
        store.append(Role::User, "Hi").unwrap();
        store.append(Role::Assistant, "Hello").unwrap();

        let client = GeminiClient::new("key", DEFAULT_MODEL);
        let body = client.build_body(&BackendRequest {
            system: Some("Be brief".into()),
            messages: store.snapshot(),
        });

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "Hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief");
    }

    #[test]
    fn test_parse_response() {
        let raw = r#"{
            "candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();

        let client = GeminiClient::new("key", DEFAULT_MODEL);
        let resp = client.parse_response(parsed).unwrap();
        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.model, DEFAULT_MODEL);
        assert_eq!(resp.usage.total_tokens, 5);
    }

    #[test]
    fn test_parse_no_candidates() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let client = GeminiClient::new("key", DEFAULT_MODEL);
        assert!(matches!(
            client.parse_response(parsed),
            Err(Error::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_url_carries_no_key() {
        let client = GeminiClient::new("SECRET-GEMINI-KEY", DEFAULT_MODEL);
        assert_eq!(
            client.build_url(),
            format!("{}{}:generateContent", GEMINI_API_URL, DEFAULT_MODEL)
        );
    }

    #[tokio::test]
    async fn test_unreachable_error_hides_key() {
        let client = GeminiClient::new("SECRET-GEMINI-KEY", DEFAULT_MODEL)
            .with_base_url("http://127.0.0.1:1/v1beta/models/");

        let err = client.generate(&BackendRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert!(!err.to_string().contains("SECRET-GEMINI-KEY"));
    }
}
