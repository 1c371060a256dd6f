//! Provider registry and the per-provider breaker registry the orchestrator
//! (C7) owns, grounded on the teacher's id-keyed breaker registry.

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::GatewayError;
use crate::providers::ChatProvider;
use dashmap::DashMap;
use std::sync::Arc;

/// `name → provider` (spec §3's `Provider` type). Names are unique: later
/// registrations overwrite earlier ones.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<DashMap<String, Arc<dyn ChatProvider>>>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self { providers: Arc::new(DashMap::new()), default_provider: default_provider.into() }
    }

    pub fn register(&self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Resolves `providerName ?? default`; absent is the fatal
    /// `Provider not found` error of spec §4.7 step 1.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn ChatProvider>, GatewayError> {
        let name = name.unwrap_or(&self.default_provider);
        self.providers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::ProviderNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// One breaker per provider, created lazily on first use (spec §3:
/// `BreakerState` is per-provider).
#[derive(Clone)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config, breakers: Arc::new(DashMap::new()) }
    }

    pub fn get_or_create(&self, provider: &str) -> CircuitBreaker {
        self.breakers.entry(provider.to_string()).or_insert_with(|| CircuitBreaker::new(self.config.clone())).clone()
    }

    /// Snapshot consumed by the metrics gauge (spec §4.8): provider name to
    /// current breaker state.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut entries: Vec<_> = self.breakers.iter().map(|e| (e.key().clone(), e.value().state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatRequest, ProviderResult};
    use async_trait::async_trait;

    struct StubProvider(&'static str);

    #[async_trait]
    impl ChatProvider for StubProvider {
        fn name(&self) -> &str {
            self.0
        }

        async fn chat(&self, _request: &ChatRequest) -> ProviderResult {
            unimplemented!("not exercised in registry tests")
        }
    }

    #[test]
    fn resolves_default_provider_when_none_named() {
        let registry = ProviderRegistry::new("openai");
        registry.register(Arc::new(StubProvider("openai")));
        registry.register(Arc::new(StubProvider("anthropic")));

        let resolved = registry.resolve(None).unwrap();
        assert_eq!(resolved.name(), "openai");
    }

    #[test]
    fn resolves_explicitly_named_provider() {
        let registry = ProviderRegistry::new("openai");
        registry.register(Arc::new(StubProvider("openai")));
        registry.register(Arc::new(StubProvider("anthropic")));

        let resolved = registry.resolve(Some("anthropic")).unwrap();
        assert_eq!(resolved.name(), "anthropic");
    }

    #[test]
    fn missing_provider_is_a_fatal_error() {
        let registry = ProviderRegistry::new("openai");
        let err = registry.resolve(Some("mistral")).unwrap_err();
        assert!(matches!(err, GatewayError::ProviderNotFound(name) if name == "mistral"));
    }

    #[test]
    fn breaker_registry_reuses_breaker_per_provider() {
        let registry = BreakerRegistry::new(CircuitBreakerConfig::default());
        let a = registry.get_or_create("openai");
        let b = registry.get_or_create("openai");
        let c = registry.get_or_create("anthropic");

        assert_eq!(registry.snapshot().len(), 2);
        // Same provider name returns a handle to the same breaker instance.
        assert_eq!(a.state(), b.state());
        assert_eq!(c.state(), CircuitState::Closed);
    }
}
