use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Short-TTL cache for composed read responses, keyed by a canonicalized
/// request fingerprint (path plus sorted query pairs).
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, serde_json::Value)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, value: serde_json::Value) {
        let mut entries = self.entries.lock().await;
        if entries.len() > 4096 {
            let ttl = self.ttl;
            entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        }
        entries.insert(key, (Instant::now(), value));
    }
}

/// Canonical request fingerprint: query pairs sorted so equivalent requests
/// in any parameter order share a cache entry.
pub fn fingerprint(path: &str, query_pairs: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = query_pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort();
    format!("{path}?{}", pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_order_insensitive() {
        let a = fingerprint(
            "/api/v1/properties",
            &[("city".into(), "Toronto".into()), ("minBeds".into(), "2".into())],
        );
        let b = fingerprint(
            "/api/v1/properties",
            &[("minBeds".into(), "2".into()), ("city".into(), "Toronto".into())],
        );
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let cache = ResponseCache::new(Duration::from_millis(10));
        cache.put("k".into(), serde_json::json!(1)).await;
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k").await.is_none());
    }
}
