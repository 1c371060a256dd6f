//! Process-wide application state (spec §3 `Ownership`, SPEC_FULL §3): the
//! orchestrator, idempotency cache, rate limiter, and metrics registry,
//! shared across the axum router via `State`.

use crate::config::GatewayConfig;
use crate::idempotency::IdempotencyCache;
use crate::metrics::Metrics;
use crate::orchestrator::Orchestrator;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::openai::OpenAiProvider;
use crate::rate_limit::RateLimiter;
use crate::registry::ProviderRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    orchestrator: Orchestrator,
    idempotency: IdempotencyCache,
    rate_limiter: RateLimiter,
    metrics: Metrics,
    started_at: std::time::Instant,
}

impl AppState {
    pub fn new(config: &GatewayConfig) -> Result<Self, crate::retry::BuildError> {
        let registry = ProviderRegistry::new(config.default_provider.clone());
        let client = reqwest::Client::new();
        if let Some(key) = &config.openai_api_key {
            registry.register(Arc::new(OpenAiProvider::new(client.clone(), key.clone())));
        }
        if let Some(key) = &config.anthropic_api_key {
            registry.register(Arc::new(AnthropicProvider::new(client.clone(), key.clone())));
        }

        let orchestrator = Orchestrator::new(registry, config.orchestrator_config())?;
        let metrics = Metrics::new().expect("metric registration never conflicts at startup");

        Ok(Self(Arc::new(Inner {
            orchestrator,
            idempotency: config.idempotency_cache(),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            metrics,
            started_at: std::time::Instant::now(),
        })))
    }

    /// Assembles state from already-built components, bypassing
    /// environment parsing. Used by integration tests that need to wire a
    /// provider registry pointed at a stub server.
    pub fn from_parts(orchestrator: Orchestrator, idempotency: IdempotencyCache, rate_limiter: RateLimiter) -> Self {
        Self(Arc::new(Inner {
            orchestrator,
            idempotency,
            rate_limiter,
            metrics: Metrics::new().expect("metric registration never conflicts at startup"),
            started_at: std::time::Instant::now(),
        }))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.0.orchestrator
    }

    pub fn idempotency(&self) -> &IdempotencyCache {
        &self.0.idempotency
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.0.rate_limiter
    }

    pub fn metrics(&self) -> &Metrics {
        &self.0.metrics
    }

    pub fn uptime_secs(&self) -> u64 {
        self.0.started_at.elapsed().as_secs()
    }
}
