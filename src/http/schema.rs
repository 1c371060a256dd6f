//! Request/response JSON shapes for `POST /v1/chat/completions` (spec §6),
//! validated with the `validator` crate before entering the orchestrator.

use crate::error::FieldError;
use crate::providers::{ChatRequest, ChatResponse, FinishReason, Message, Role, Usage};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

#[derive(Debug, Deserialize, Validate)]
pub struct MessageBody {
    pub role: RoleBody,
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleBody {
    System,
    User,
    Assistant,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatCompletionRequestBody {
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
    #[validate(length(min = 1, message = "messages must not be empty"), nested)]
    pub messages: Vec<MessageBody>,
    #[validate(range(min = 0.0, max = 2.0, message = "temperature must be in [0, 2]"))]
    pub temperature: Option<f64>,
    #[validate(range(min = 1, message = "maxTokens must be positive"))]
    #[serde(rename = "maxTokens")]
    pub max_tokens: Option<u32>,
    pub provider: Option<String>,
    #[validate(range(min = 1, message = "timeout must be positive"))]
    pub timeout: Option<u64>,
}

impl ChatCompletionRequestBody {
    pub fn into_chat_request(self) -> ChatRequest {
        ChatRequest {
            model: self.model,
            messages: self.messages.into_iter().map(MessageBody::into_message).collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout,
        }
    }
}

impl MessageBody {
    fn into_message(self) -> Message {
        Message {
            role: match self.role {
                RoleBody::System => Role::System,
                RoleBody::User => Role::User,
                RoleBody::Assistant => Role::Assistant,
            },
            content: self.content,
        }
    }
}

/// Response body for a successful chat completion (spec §3 `ChatResponse`).
#[derive(Debug, Serialize, Validate)]
pub struct ChatCompletionResponseBody {
    pub id: String,
    pub content: String,
    pub model: String,
    #[serde(rename = "finishReason")]
    pub finish_reason: FinishReasonBody,
    pub usage: UsageBody,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReasonBody {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Serialize)]
pub struct UsageBody {
    #[serde(rename = "promptTokens")]
    pub prompt_tokens: u32,
    #[serde(rename = "completionTokens")]
    pub completion_tokens: u32,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u32,
}

impl From<ChatResponse> for ChatCompletionResponseBody {
    fn from(response: ChatResponse) -> Self {
        Self {
            id: response.id,
            content: response.content,
            model: response.model,
            finish_reason: match response.finish_reason {
                FinishReason::Stop => FinishReasonBody::Stop,
                FinishReason::Length => FinishReasonBody::Length,
                FinishReason::ContentFilter => FinishReasonBody::ContentFilter,
            },
            usage: UsageBody {
                prompt_tokens: response.usage.prompt_tokens,
                completion_tokens: response.usage.completion_tokens,
                total_tokens: response.usage.total_tokens,
            },
        }
    }
}

/// Flattens `validator`'s nested field-error map into spec §4.9's
/// `details: <field errors>` list.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect_field_errors(errors, "", &mut out);
    out
}

fn collect_field_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            validator::ValidationErrorsKind::Field(errs) => {
                for e in errs {
                    let message = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                    out.push(FieldError { field: path.clone(), message });
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => collect_field_errors(nested, &path, out),
            validator::ValidationErrorsKind::List(list) => {
                for (index, nested) in list {
                    collect_field_errors(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_body() -> ChatCompletionRequestBody {
        ChatCompletionRequestBody {
            model: "gpt-4".to_string(),
            messages: vec![MessageBody { role: RoleBody::User, content: "hi".to_string() }],
            temperature: Some(0.7),
            max_tokens: Some(256),
            provider: None,
            timeout: None,
        }
    }

    #[test]
    fn valid_body_passes_validation() {
        assert!(valid_body().validate().is_ok());
    }

    #[test]
    fn empty_messages_fails_validation() {
        let mut body = valid_body();
        body.messages.clear();
        let errors = body.validate().unwrap_err();
        assert!(!field_errors(&errors).is_empty());
    }

    #[test]
    fn out_of_range_temperature_fails_validation() {
        let mut body = valid_body();
        body.temperature = Some(3.0);
        assert!(body.validate().is_err());
    }

    #[test]
    fn blank_message_content_fails_nested_validation() {
        let mut body = valid_body();
        body.messages.push(MessageBody { role: RoleBody::User, content: String::new() });
        let errors = body.validate().unwrap_err();
        let flattened = field_errors(&errors);
        assert!(flattened.iter().any(|e| e.field.contains("messages")));
    }
}
