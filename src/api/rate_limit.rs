use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Sliding-window per-user limiter.
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Returns Ok(()) if allowed, Err with seconds until the next slot.
    pub async fn check(&self, user_id: &str) -> Result<(), u64> {
        let mut map = self.requests.lock().await;
        let now = Instant::now();
        let entry = map.entry(user_id.to_string()).or_default();

        // Evict expired entries
        while entry.front().is_some_and(|t| now.duration_since(*t) > self.window) {
            entry.pop_front();
        }

        if entry.len() >= self.max_requests {
            let oldest = entry.front().unwrap();
            let retry_after = self.window.as_secs() - now.duration_since(*oldest).as_secs();
            return Err(retry_after.max(1));
        }

        entry.push_back(now);
        Ok(())
    }
}
