//! Provider abstraction (C1, spec §4.1): the contract the retry/breaker
//! pipeline invokes, plus the vendor adapters that implement it.

pub mod anthropic;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One turn in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Immutable once constructed (spec §3).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// `{err, error, retryable}` from spec §3. HTTP status ≥ 500 or 429 is
/// retryable; any other status with a body is not; transport-level
/// failures (no response at all) are retryable (spec §4.1).
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub message: String,
    pub retryable: bool,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {}

impl crate::retry::Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl ProviderError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let retryable = status.is_server_error() || status.as_u16() == 429;
        Self { message: format!("{}: {}", status, body), retryable }
    }

    pub fn transport(err: &reqwest::Error) -> Self {
        Self { message: err.to_string(), retryable: true }
    }
}

pub type ProviderResult = Result<ChatResponse, ProviderError>;

/// Uniform contract every vendor adapter implements (spec §4.1): translate
/// the universal request into a vendor call and the vendor response back,
/// never throwing — failures are reported through `ProviderResult`.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(&self, request: &ChatRequest) -> ProviderResult;
}
