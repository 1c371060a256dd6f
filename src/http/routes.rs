//! Axum handlers (C9, spec §4.9/§6): health, metrics, and the
//! reliability-hardened chat-completions endpoint.

use super::schema::{field_errors, ChatCompletionRequestBody, ChatCompletionResponseBody};
use crate::error::{FieldError, GatewayError};
use crate::rate_limit::RateDecision;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::time::Instant;
use validator::Validate;

const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";
const REQUEST_ID_HEADER: &str = "x-request-id";
const CACHED_HEADER: &str = "x-cached";

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn client_key(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

fn rate_limit_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
        headers.insert("x-ratelimit-reset", value);
    }
}

pub async fn health(headers: HeaderMap, State(state): State<AppState>) -> Response {
    let body = serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.uptime_secs(),
        "requestId": request_id(&headers),
    });
    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id(&headers)) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    for (provider, breaker_state) in state.orchestrator().breakers().snapshot() {
        state.metrics().set_circuit_breaker_state(&provider, breaker_state);
    }
    let (body, content_type) = state.metrics().export();
    let mut response = (StatusCode::OK, body).into_response();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
    }
    response
}

/// `POST /v1/chat/completions` (spec §4.9/§5): rate limit first, then an
/// idempotency hit short-circuits, else validate → orchestrate → cache → respond.
pub async fn chat_completions(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = request_id(&headers);
    let idempotency_key = headers.get(IDEMPOTENCY_KEY_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);

    let key = client_key(&headers, addr);
    let decision = state.rate_limiter().check(&key);
    if !decision.allowed {
        state.metrics().record_rate_limit_exceeded(&key);
        let retry_after = (decision.reset_at - chrono::Utc::now()).num_seconds().max(0) as u64 + 1;
        let mut response = GatewayError::RateLimited { retry_after_secs: retry_after }.into_response();
        rate_limit_headers(&mut response, &decision);
        return response;
    }

    if let Some(key) = &idempotency_key {
        if let Some(cached) = state.idempotency().get(key) {
            state.metrics().record_cache_hit("idempotency");
            let mut response = (StatusCode::OK, Json(ChatCompletionResponseBody::from(cached))).into_response();
            response.headers_mut().insert(CACHED_HEADER, HeaderValue::from_static("true"));
            rate_limit_headers(&mut response, &decision);
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            return response;
        }
        state.metrics().record_cache_miss("idempotency");
    }

    let parsed: ChatCompletionRequestBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            let mut response =
                GatewayError::Validation(vec![FieldError { field: "body".to_string(), message: err.to_string() }])
                    .into_response();
            rate_limit_headers(&mut response, &decision);
            return response;
        }
    };

    if let Err(errors) = parsed.validate() {
        let mut response = GatewayError::Validation(field_errors(&errors)).into_response();
        rate_limit_headers(&mut response, &decision);
        return response;
    }

    let provider_name = parsed.provider.clone();
    let chat_request = parsed.into_chat_request();
    let model = chat_request.model.clone();
    let request_timeout = std::time::Duration::from_millis(chat_request.timeout_ms.unwrap_or(30_000));
    let start = Instant::now();

    let outcome = match tokio::time::timeout(request_timeout, state.orchestrator().chat(chat_request, provider_name.as_deref())).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(GatewayError::Timeout),
    };
    let provider_label = provider_name.as_deref().unwrap_or("default");

    let mut response = match outcome {
        Ok(chat_response) => {
            state.metrics().observe_provider_call(provider_label, &model, "ok", start.elapsed().as_secs_f64());
            state.metrics().record_tokens(provider_label, &model, chat_response.usage.prompt_tokens, chat_response.usage.completion_tokens);

            let response_body = ChatCompletionResponseBody::from(chat_response.clone());
            if let Err(errors) = validate_response(&response_body) {
                GatewayError::Internal(format!("provider response failed schema validation: {:?}", errors)).into_response_with_request_id(&request_id)
            } else {
                if let Some(key) = &idempotency_key {
                    state.idempotency().set(key, chat_response);
                }
                (StatusCode::OK, Json(response_body)).into_response()
            }
        }
        Err(err) => {
            state.metrics().observe_provider_call(provider_label, &model, "error", start.elapsed().as_secs_f64());
            err.into_response_with_request_id(&request_id)
        }
    };

    rate_limit_headers(&mut response, &decision);
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Defense-in-depth re-validation of the provider's response (spec §4.9
/// step 3): the response body has no custom `Validate` rules today beyond
/// deserializing cleanly, so this simply confirms that invariant.
fn validate_response(body: &ChatCompletionResponseBody) -> Result<(), String> {
    if body.id.is_empty() {
        return Err("response id must not be empty".to_string());
    }
    Ok(())
}
