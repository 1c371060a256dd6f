//! Anthropic-shaped chat-completions adapter (spec §4.1): the first
//! `system` message, if any, is lifted out as a top-level system directive;
//! a default `maxTokens` of 4096 applies when the caller didn't set one.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatProvider, ChatRequest, ChatResponse, FinishReason, Message, ProviderError, ProviderResult, Role, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
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
        // The system role never reaches the wire message list: it is
        // lifted out below. Kept exhaustive so a future Role variant
        // can't silently fall through unmapped.
        Role::System => "user",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

fn map_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("max_tokens") => FinishReason::Length,
        // Anthropic has no dedicated content-filter stop reason today;
        // collapse everything else into `stop` per spec §4.1.
        _ => FinishReason::Stop,
    }
}

/// Lifts the first `system` message out, preserving the order of the rest.
fn split_system(messages: &[Message]) -> (Option<&str>, Vec<&Message>) {
    let mut system = None;
    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if system.is_none() && message.role == Role::System {
            system = Some(message.content.as_str());
        } else {
            rest.push(message);
        }
    }
    (system, rest)
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult {
        let (system, rest) = split_system(&request.messages);
        let messages: Vec<WireMessage<'_>> =
            rest.iter().map(|m| WireMessage { role: role_str(&m.role), content: &m.content }).collect();

        let body = CompletionRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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

        let content = parsed.content.first().map(|b| b.text.clone()).unwrap_or_default();

        Ok(ChatResponse {
            id: parsed.id,
            content,
            model: parsed.model,
            finish_reason: map_finish_reason(parsed.stop_reason.as_deref()),
            usage: Usage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
                total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
            },
        })
    }
}
