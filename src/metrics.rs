//! Metrics surface (C8, spec §4.8): a process-wide Prometheus registry plus
//! the counters/histograms/gauges the gateway exposes.

use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

const HTTP_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.3, 0.5, 1.0, 2.0, 5.0, 10.0];
const PROVIDER_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http_request_duration: HistogramVec,
    http_requests_total: IntCounterVec,
    provider_latency: HistogramVec,
    tokens_total: IntCounterVec,
    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounterVec,
    circuit_breaker_state: IntGaugeVec,
    rate_limit_exceeded_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_request_duration = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "llm_gateway_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_DURATION_BUCKETS.to_vec()),
            &["method", "route", "status_code"],
        )?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("llm_gateway_http_requests_total", "Total HTTP requests"),
            &["method", "route", "status_code"],
        )?;
        let provider_latency = HistogramVec::new(
            prometheus::HistogramOpts::new("llm_gateway_provider_latency_seconds", "Provider call latency in seconds")
                .buckets(PROVIDER_LATENCY_BUCKETS.to_vec()),
            &["provider", "model", "status"],
        )?;
        let tokens_total = IntCounterVec::new(
            Opts::new("llm_gateway_tokens_total", "Total tokens processed"),
            &["provider", "model", "type"],
        )?;
        let cache_hits_total = IntCounterVec::new(Opts::new("llm_gateway_cache_hits_total", "Cache hits"), &["type"])?;
        let cache_misses_total =
            IntCounterVec::new(Opts::new("llm_gateway_cache_misses_total", "Cache misses"), &["type"])?;
        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("llm_gateway_circuit_breaker_state", "0=closed, 1=open, 2=half-open"),
            &["provider"],
        )?;
        let rate_limit_exceeded_total = IntCounterVec::new(
            Opts::new("llm_gateway_rate_limit_exceeded_total", "Rate limit rejections"),
            &["key"],
        )?;

        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(provider_latency.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;
        registry.register(Box::new(rate_limit_exceeded_total.clone()))?;

        Ok(Self {
            registry,
            http_request_duration,
            http_requests_total,
            provider_latency,
            tokens_total,
            cache_hits_total,
            cache_misses_total,
            circuit_breaker_state,
            rate_limit_exceeded_total,
        })
    }

    pub fn observe_http_request(&self, method: &str, route: &str, status_code: u16, duration_secs: f64) {
        let status = status_code.to_string();
        self.http_request_duration.with_label_values(&[method, route, &status]).observe(duration_secs);
        self.http_requests_total.with_label_values(&[method, route, &status]).inc();
    }

    pub fn observe_provider_call(&self, provider: &str, model: &str, status: &str, duration_secs: f64) {
        self.provider_latency.with_label_values(&[provider, model, status]).observe(duration_secs);
    }

    pub fn record_tokens(&self, provider: &str, model: &str, prompt: u32, completion: u32) {
        self.tokens_total.with_label_values(&[provider, model, "prompt"]).inc_by(prompt as u64);
        self.tokens_total.with_label_values(&[provider, model, "completion"]).inc_by(completion as u64);
    }

    pub fn record_cache_hit(&self, cache: &str) {
        self.cache_hits_total.with_label_values(&[cache]).inc();
    }

    pub fn record_cache_miss(&self, cache: &str) {
        self.cache_misses_total.with_label_values(&[cache]).inc();
    }

    pub fn set_circuit_breaker_state(&self, provider: &str, state: crate::breaker::CircuitState) {
        let value = match state {
            crate::breaker::CircuitState::Closed => 0,
            crate::breaker::CircuitState::Open => 1,
            crate::breaker::CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.with_label_values(&[provider]).set(value);
    }

    pub fn record_rate_limit_exceeded(&self, key: &str) {
        self.rate_limit_exceeded_total.with_label_values(&[key]).inc();
    }

    /// Current registry snapshot in Prometheus text exposition format
    /// (spec §4.8), plus the canonical content type.
    pub fn export(&self) -> (String, &'static str) {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).expect("prometheus encoding never fails for well-formed metrics");
        (String::from_utf8(buffer).expect("prometheus text encoding is always valid utf-8"), encoder.format_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_includes_registered_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_http_request("POST", "/v1/chat/completions", 200, 0.05);
        metrics.record_cache_hit("idempotency");
        metrics.set_circuit_breaker_state("openai", crate::breaker::CircuitState::Open);

        let (body, content_type) = metrics.export();
        assert!(body.contains("llm_gateway_http_requests_total"));
        assert!(body.contains("llm_gateway_cache_hits_total"));
        assert!(body.contains("llm_gateway_circuit_breaker_state"));
        assert!(content_type.contains("text/plain"));
    }

    #[test]
    fn token_counters_accumulate_by_type() {
        let metrics = Metrics::new().unwrap();
        metrics.record_tokens("openai", "gpt-4", 10, 5);
        metrics.record_tokens("openai", "gpt-4", 3, 2);

        let (body, _) = metrics.export();
        assert!(body.contains(r#"type="prompt""#));
        assert!(body.contains(r#"type="completion""#));
    }
}
