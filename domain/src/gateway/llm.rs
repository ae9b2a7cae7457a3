//! Client for an OpenAI compatible chat completion endpoint.
//!
//! The request is forwarded as-is apart from the model id, and the provider's
//! JSON response is handed back untouched.

use std::time::Duration;

use log::*;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use service::config::Config;
use utoipa::ToSchema;

use crate::error::{
    config_error, external_error, invalid_error, network_error, Error, ExternalErrorKind,
    ExternalService,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request accepted from callers.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the configured model when present.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    default_model: Option<String>,
}

impl LlmClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let api_key = config
            .llm_api_key()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                warn!("Failed to get LLM API key from config");
                config_error("LLM_API_KEY is not configured")
            })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
            warn!("Failed to create LLM auth header: {e:?}");
            config_error("Invalid LLM API key format")
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.llm_base_url().trim_end_matches('/').to_string(),
            default_model: config.llm_model_id(),
        })
    }

    /// Forward `request` to `{base_url}/chat/completions`.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<serde_json::Value, Error> {
        if request.messages.is_empty() {
            return Err(invalid_error("messages must not be empty"));
        }

        let model = request
            .model
            .as_deref()
            .or(self.default_model.as_deref())
            .filter(|model| !model.is_empty())
            .ok_or_else(|| config_error("MODEL_ID is not configured"))?;

        let body = CompletionBody {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "Requesting chat completion from model {model} with {} message(s)",
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach LLM endpoint: {e:?}");
                network_error(ExternalService::Llm, e)
            })?;

        if response.status().is_success() {
            response.json::<serde_json::Value>().await.map_err(|e| {
                warn!("Failed to parse LLM response: {e:?}");
                external_error(
                    ExternalErrorKind::Other(ExternalService::Llm, "Invalid response from LLM".to_string()),
                    &e.to_string(),
                )
            })
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("LLM API returned {status}: {error_text}");
            Err(external_error(
                ExternalErrorKind::Other(ExternalService::Llm, error_text.clone()),
                &format!("LLM API returned {status}: {error_text}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, InternalErrorKind};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn request(content: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: content.to_string(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_chat_completion_forwards_messages_with_configured_model() {
        let mut server = Server::new_async().await;
        let provider_response = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "# Notes"}}]
        });
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::Json(json!({
                "model": "ep-123",
                "messages": [{"role": "user", "content": "summarize"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(provider_response.to_string())
            .create_async()
            .await;

        let config = Config::from_env().set_llm(&server.url(), "ep-123", "test-key");
        let client = LlmClient::new(&config).unwrap();
        let response = client.chat_completion(&request("summarize")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response, provider_response);
    }

    #[tokio::test]
    async fn test_request_model_and_sampling_options_are_forwarded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({
                "model": "other-model",
                "temperature": 0.5,
                "max_tokens": 256
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = Config::from_env().set_llm(&server.url(), "ep-123", "test-key");
        let client = LlmClient::new(&config).unwrap();
        let mut chat = request("hi");
        chat.model = Some("other-model".to_string());
        chat.temperature = Some(0.5);
        chat.max_tokens = Some(256);

        client.chat_completion(&chat).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_error_carries_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let config = Config::from_env().set_llm(&server.url(), "ep-123", "bad-key");
        let client = LlmClient::new(&config).unwrap();
        let err = client.chat_completion(&request("hi")).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Other(
                ExternalService::Llm,
                "invalid api key".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_empty_messages_are_rejected_before_any_call() {
        let config = Config::from_env().set_llm("http://127.0.0.1:1", "ep-123", "test-key");
        let client = LlmClient::new(&config).unwrap();
        let err = client
            .chat_completion(&ChatRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Invalid(_))
        ));
    }
}
