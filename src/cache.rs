use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Key-value store for persisted queries and cached responses.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// `ttl_seconds == 0` keeps the entry until it is evicted.
    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64);
}

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
    inserted: u64,
}

/// Bounded in-process cache. When full, expired entries go first, then the oldest.
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
    counter: AtomicU64,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        InMemoryCache {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            counter: AtomicU64::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        InMemoryCache::new(1024)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock().await;
        let expired = entries
            .get(key)?
            .expires_at
            .is_some_and(|at| at <= Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: Bytes, ttl_seconds: u64) {
        let now = Instant::now();
        let expires_at = (ttl_seconds > 0).then(|| now + Duration::from_secs(ttl_seconds));
        let inserted = self.counter.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.expires_at.is_none_or(|at| at > now));
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                inserted,
            },
        );
    }
}

/// Lowercase hex sha256 of a query string.
pub fn query_hash(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

pub fn persisted_query_key(hash: &str) -> String {
    format!("apq|{hash}")
}

/// Key of a cached response. `headers` are the request headers forwarded
/// upstream, so clients with different credentials never share an entry.
pub fn response_cache_key(
    query: &str,
    operation_name: Option<&str>,
    variables: &Value,
    headers: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update([0]);
    hasher.update(operation_name.unwrap_or_default().as_bytes());
    hasher.update([0]);
    hasher.update(variables.to_string().as_bytes());
    for (name, value) in headers {
        hasher.update([0]);
        hasher.update(name.as_bytes());
        hasher.update([b':']);
        hasher.update(value.as_bytes());
    }
    format!("response|{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = InMemoryCache::new(8);
        cache.set("a", Bytes::from_static(b"1"), 60).await;
        cache.set("b", Bytes::from_static(b"2"), 0).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("a").await, Some(Bytes::from_static(b"1")));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(Bytes::from_static(b"2")));
    }

    #[tokio::test]
    async fn evicts_the_oldest_entry_when_full() {
        let cache = InMemoryCache::new(2);
        cache.set("a", Bytes::from_static(b"1"), 0).await;
        cache.set("b", Bytes::from_static(b"2"), 0).await;
        cache.set("c", Bytes::from_static(b"3"), 0).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert!(cache.get("c").await.is_some());
    }

    #[test]
    fn keys_are_stable_hashes() {
        assert_eq!(
            query_hash("{__typename}"),
            "ecf4edb46db40b5132295c0291d62fb65d6759a9eedfa4d5d612dd5ec54a6b38"
        );
        assert_eq!(persisted_query_key("abc"), "apq|abc");
        let no_headers = BTreeMap::new();
        let key = response_cache_key("{ a }", None, &json!({ "x": 1 }), &no_headers);
        assert!(key.starts_with("response|"));
        assert_ne!(key, response_cache_key("{ a }", Some("A"), &json!({ "x": 1 }), &no_headers));
    }

    #[test]
    fn response_keys_vary_on_forwarded_headers() {
        let as_user = |token: &str| BTreeMap::from([("authorization".to_string(), token.to_string())]);
        let alice = response_cache_key("{ me }", None, &Value::Null, &as_user("alice"));
        let bob = response_cache_key("{ me }", None, &Value::Null, &as_user("bob"));
        assert_ne!(alice, bob);
        assert_eq!(alice, response_cache_key("{ me }", None, &Value::Null, &as_user("alice")));
        assert_ne!(alice, response_cache_key("{ me }", None, &Value::Null, &BTreeMap::new()));
    }
}
