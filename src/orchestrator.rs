//! Orchestrator (C7, spec §4.7): composes the provider registry, retry
//! driver, circuit breaker, and coalescer into one `chat(req, providerName)`
//! call. Wrapper order follows spec §1: `retry ∘ breaker ∘ coalesce ∘ provider`.

use crate::breaker::{BreakerError, CircuitBreakerConfig};
use crate::coalesce::Coalescer;
use crate::error::GatewayError;
use crate::providers::{ChatRequest, ChatResponse, Message, ProviderError, Role};
use crate::registry::{BreakerRegistry, ProviderRegistry};
use crate::retry::{RetryConfig, RetryError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

impl crate::retry::Retryable for Arc<ProviderError> {
    fn is_retryable(&self) -> bool {
        self.as_ref().is_retryable()
    }
}

#[derive(Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub coalesce_window: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { retry: RetryConfig::default(), breaker: CircuitBreakerConfig::default(), coalesce_window: Duration::from_millis(100) }
    }
}

pub struct Orchestrator {
    registry: ProviderRegistry,
    breakers: BreakerRegistry,
    retry_policy: RetryPolicy,
    coalescer: Coalescer<ChatResponse, ProviderError>,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry, config: OrchestratorConfig) -> Result<Self, crate::retry::BuildError> {
        Ok(Self {
            registry,
            breakers: BreakerRegistry::new(config.breaker),
            retry_policy: RetryPolicy::from_config(&config.retry)?,
            coalescer: Coalescer::new(config.coalesce_window),
        })
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// `chat(req, providerName) → ChatResponse` (spec §4.7).
    pub async fn chat(&self, request: ChatRequest, provider_name: Option<&str>) -> Result<ChatResponse, GatewayError> {
        let provider = self.registry.resolve(provider_name)?;
        let breaker = self.breakers.get_or_create(provider.name());
        let key = fingerprint(provider.name(), &request);

        let outcome = self
            .retry_policy
            .execute(|_attempt| {
                let provider = provider.clone();
                let request = request.clone();
                let breaker = breaker.clone();
                let coalescer = &self.coalescer;
                let key = key.clone();
                async move {
                    breaker
                        .fire(|| {
                            let provider = provider.clone();
                            let request = request.clone();
                            async move { coalescer.execute(&key, move || async move { provider.chat(&request).await }).await }
                        })
                        .await
                }
            })
            .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(RetryError::NonRetryable(inner)) => Err(breaker_error_to_gateway_error(inner, None)),
            Err(RetryError::Exhausted { attempts, last }) => Err(breaker_error_to_gateway_error(last, Some(attempts))),
        }
    }
}

fn breaker_error_to_gateway_error(err: BreakerError<Arc<ProviderError>>, attempts: Option<usize>) -> GatewayError {
    match (err, attempts) {
        (BreakerError::Open, _) => GatewayError::Upstream("Circuit breaker is OPEN".to_string()),
        (BreakerError::Timeout, _) => GatewayError::Timeout,
        (BreakerError::Inner(e), None) => GatewayError::Upstream(e.message.clone()),
        (BreakerError::Inner(e), Some(attempts)) => {
            GatewayError::Upstream(format!("retry exhausted after {} attempts: {}", attempts, e.message))
        }
    }
}

/// Canonical fingerprint over `{providerName, model, messages, temperature,
/// maxTokens}` (spec §4.4/§4.7).
fn fingerprint(provider: &str, request: &ChatRequest) -> String {
    let mut key = format!("{}|{}|{:?}|{:?}", provider, request.model, request.temperature, request.max_tokens);
    for message in &request.messages {
        key.push('|');
        key.push_str(role_tag(&message.role));
        key.push(':');
        key.push_str(&message.content);
    }
    key
}

fn role_tag(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}
