//! Environment-driven configuration (C10, spec §6). Parsed once at process
//! start; malformed values are rejected with a typed error rather than a
//! panic, following the teacher's validate-then-build idiom.

use crate::breaker::CircuitBreakerConfig;
use crate::idempotency::IdempotencyCache;
use crate::orchestrator::OrchestratorConfig;
use crate::rate_limit::RateLimiterConfig;
use crate::retry::RetryConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} has an invalid value {value:?}: {reason}")]
    InvalidValue { name: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub default_provider: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub rate_limit: RateLimiterConfig,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub idempotency_ttl: Duration,
    pub log_level: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_env("PORT", 3000)?,
            default_provider: env::var("DEFAULT_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            rate_limit: RateLimiterConfig {
                max_requests: parse_env("RATE_LIMIT_MAX", 100)?,
                window: Duration::from_millis(parse_env("RATE_LIMIT_WINDOW_MS", 60_000)?),
            },
            retry: RetryConfig {
                max_attempts: parse_env("RETRY_MAX_ATTEMPTS", 3)?,
                initial_delay: Duration::from_millis(parse_env("RETRY_INITIAL_DELAY_MS", 100)?),
                max_delay: Duration::from_millis(parse_env("RETRY_MAX_DELAY_MS", 5_000)?),
                factor: 2.0,
            },
            breaker: CircuitBreakerConfig {
                error_threshold_percentage: parse_env("CIRCUIT_ERROR_THRESHOLD", 50)?,
                min_samples: 10,
                reset_timeout: Duration::from_millis(parse_env("CIRCUIT_RESET_TIMEOUT_MS", 60_000)?),
                call_timeout: Duration::from_millis(parse_env("CIRCUIT_TIMEOUT_MS", 30_000)?),
            },
            idempotency_ttl: Duration::from_millis(parse_env("IDEMPOTENCY_TTL_MS", 3_600_000)?),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig { retry: self.retry.clone(), breaker: self.breaker.clone(), coalesce_window: Duration::from_millis(100) }
    }

    pub fn idempotency_cache(&self) -> IdempotencyCache {
        IdempotencyCache::new(self.idempotency_ttl)
    }
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue { name, value, reason: e.to_string() }),
    }
}
