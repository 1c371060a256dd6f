//! Idempotency cache (C5, spec §4.5): TTL map from a client-supplied key to
//! a finalized, successful response.

use crate::providers::ChatResponse;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

#[derive(Clone)]
struct Entry {
    response: ChatResponse,
    inserted_at: DateTime<Utc>,
}

pub struct IdempotencyCache {
    ttl: Duration,
    entries: DashMap<String, Entry>,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: DashMap::new() }
    }

    /// Returns the stored response iff it's still within TTL; lazily
    /// deletes and returns `None` otherwise (spec §4.5).
    pub fn get(&self, key: &str) -> Option<ChatResponse> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<ChatResponse> {
        let ttl = chrono::Duration::from_std(self.ttl).expect("ttl fits in chrono::Duration");
        let response = self
            .entries
            .get(key)
            .filter(|entry| now - entry.inserted_at <= ttl)
            .map(|entry| entry.response.clone());

        if response.is_none() {
            self.entries.remove(key);
        }
        response
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Only fully validated, successful responses are stored (spec §4.5).
    pub fn set(&self, key: &str, response: ChatResponse) {
        self.entries.insert(key.to_string(), Entry { response, inserted_at: Utc::now() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{FinishReason, Usage};

    fn sample(id: &str) -> ChatResponse {
        ChatResponse {
            id: id.to_string(),
            content: "hello".to_string(),
            model: "gpt-4".to_string(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }

    #[test]
    fn returns_none_for_missing_key() {
        let cache = IdempotencyCache::new(Duration::from_secs(3600));
        assert!(cache.get("missing").is_none());
        assert!(!cache.has("missing"));
    }

    #[test]
    fn set_then_get_returns_the_same_response() {
        let cache = IdempotencyCache::new(Duration::from_secs(3600));
        cache.set("key-1", sample("resp-1"));

        let got = cache.get("key-1").unwrap();
        assert_eq!(got.id, "resp-1");
        assert!(cache.has("key-1"));
    }

    #[test]
    fn expires_entries_past_ttl() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        cache.set("key-1", sample("resp-1"));

        let past_ttl = Utc::now() + chrono::Duration::seconds(61);
        assert!(cache.get_at("key-1", past_ttl).is_none());
        // Lazily deleted: a second read at the same time still finds nothing.
        assert!(cache.get_at("key-1", past_ttl).is_none());
    }

    #[test]
    fn overwrite_replaces_existing_entry() {
        let cache = IdempotencyCache::new(Duration::from_secs(3600));
        cache.set("key-1", sample("first"));
        cache.set("key-1", sample("second"));

        assert_eq!(cache.get("key-1").unwrap().id, "second");
    }
}
