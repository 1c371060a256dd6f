//! OpenAI-shaped chat-completions adapter (spec §4.1): messages pass through
//! unchanged, finish reason and usage are read straight off the response.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatProvider, ChatRequest, ChatResponse, FinishReason, Message, ProviderError, ProviderResult, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key, base_url: DEFAULT_BASE_URL.to_string() }
    }

    /// Points the adapter at an alternate base URL; used by tests to target
    /// a stub server instead of the live vendor API.
    pub fn with_base_url(client: Client, api_key: String, base_url: String) -> Self {
        Self { client, api_key, base_url }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    id: String,
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

fn map_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult {
        let messages: Vec<WireMessage<'_>> = request
            .messages
            .iter()
            .map(|m| WireMessage { role: role_str(&m.role), content: &m.content })
            .collect();

        let body = CompletionRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &text));
        }

        let parsed: CompletionResponse =
            response.json().await.map_err(|e| ProviderError::transport(&e))?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| ProviderError {
            message: "provider returned no choices".to_string(),
            retryable: false,
        })?;

        let usage = parsed.usage.unwrap_or_default();

        Ok(ChatResponse {
            id: parsed.id,
            content: choice.message.content,
            model: parsed.model,
            finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4".to_string(),
            messages: vec![Message { role: Role::User, content: "hi".to_string() }],
            temperature: None,
            max_tokens: None,
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn maps_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4",
                "choices": [{"message": {"content": "hello there"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url(Client::new(), "test-key".to_string(), server.uri());
        let response = provider.chat(&request()).await.unwrap();

        assert_eq!(response.content, "hello there");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn maps_length_finish_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-2",
                "model": "gpt-4",
                "choices": [{"message": {"content": "truncated"}, "finish_reason": "length"}],
                "usage": {}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url(Client::new(), "test-key".to_string(), server.uri());
        let response = provider.chat(&request()).await.unwrap();

        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url(Client::new(), "test-key".to_string(), server.uri());
        let err = provider.chat(&request()).await.unwrap_err();

        assert!(err.retryable);
    }

    #[tokio::test]
    async fn client_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::with_base_url(Client::new(), "test-key".to_string(), server.uri());
        let err = provider.chat(&request()).await.unwrap_err();

        assert!(!err.retryable);
    }
}
