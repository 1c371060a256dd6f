#![forbid(unsafe_code)]

//! # LLM Gateway
//!
//! A reliability-hardened HTTP gateway fronting remote LLM chat-completion
//! providers (`openai`, `anthropic`) behind a single `/v1/chat/completions`
//! endpoint: per-client rate limiting, idempotency caching, request
//! coalescing, per-provider circuit breaking, and exponential-backoff retry.

pub mod backoff;
pub mod breaker;
pub mod clock;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod http;
pub mod idempotency;
pub mod jitter;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod sleeper;
pub mod state;
