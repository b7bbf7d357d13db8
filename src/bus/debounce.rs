use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Keyed time-gate used for per-entity debouncing.
///
/// On receipt the worker reads the last-processed instant for the key: inside
/// the window the event is dropped, otherwise the key is re-stamped and the
/// event proceeds. Entries older than the window are purged opportunistically
/// so the map stays bounded by the set of recently active keys.
pub struct DebounceGate {
    window: Duration,
    last_processed: Mutex<HashMap<String, Instant>>,
}

impl DebounceGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_processed: Mutex::new(HashMap::new()),
        }
    }

    /// Check-and-stamp: returns false when the key was processed within the
    /// window (caller drops the event), true otherwise.
    pub fn admit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.last_processed.lock().unwrap();

        if map.len() > 1024 {
            map.retain(|_, t| now.duration_since(*t) < self.window);
        }

        match map.get(key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                map.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Stamp a key without gating — used when a bypass condition processed
    /// the event regardless of the window.
    pub fn record(&self, key: &str) {
        self.last_processed
            .lock()
            .unwrap()
            .insert(key.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_event_within_window_is_dropped() {
        let gate = DebounceGate::new(Duration::from_secs(30));
        assert!(gate.admit("L1"));
        assert!(!gate.admit("L1"));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let gate = DebounceGate::new(Duration::from_secs(30));
        assert!(gate.admit("L1"));
        assert!(gate.admit("L2"));
    }

    #[test]
    fn zero_window_admits_everything() {
        let gate = DebounceGate::new(Duration::ZERO);
        assert!(gate.admit("L1"));
        assert!(gate.admit("L1"));
    }

    #[test]
    fn record_closes_the_window() {
        let gate = DebounceGate::new(Duration::from_secs(30));
        gate.record("L1");
        assert!(!gate.admit("L1"));
    }
}
