use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

/// Remembers which inbound events were already handled so that a chat
/// platform redelivering the same event does not route it twice.
pub struct EventDeduper {
    ttl: Duration,
    max_size: usize,
    seen: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

pub fn dedupe_key(event_id: Option<&str>, ts: &str) -> String {
    match event_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("ts:{ts}"),
    }
}

impl EventDeduper {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size: max_size.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `key`; returns false if it was already seen and has not expired.
    pub fn first_sighting(&mut self, key: &str) -> bool {
        self.first_sighting_at(key, Instant::now())
    }

    fn first_sighting_at(&mut self, key: &str, now: Instant) -> bool {
        self.evict_expired(now);
        if self.seen.contains_key(key) {
            return false;
        }

        if self.seen.len() >= self.max_size {
            let to_remove = (self.max_size / 10).max(1);
            for _ in 0..to_remove {
                self.pop_oldest();
            }
            debug!(evicted = to_remove, "event cache full");
        }

        self.seen.insert(key.to_string(), now);
        self.order.push_back((key.to_string(), now));
        true
    }

    /// Drop `key` so a redelivery of that event is processed again.
    pub fn forget(&mut self, key: &str) {
        if self.seen.remove(key).is_some() {
            self.order.retain(|(k, _)| k != key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((_, at)) = self.order.front() {
            if now.duration_since(*at) <= self.ttl {
                break;
            }
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) {
        if let Some((key, _)) = self.order.pop_front() {
            self.seen.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_falls_back_to_timestamp() {
        assert_eq!(dedupe_key(Some("Ev1"), "1.0"), "Ev1");
        assert_eq!(dedupe_key(None, "1.0"), "ts:1.0");
        assert_eq!(dedupe_key(Some(""), "1.0"), "ts:1.0");
    }

    #[test]
    fn test_second_sighting_is_rejected() {
        let mut cache = EventDeduper::new(Duration::from_secs(60), 100);
        assert!(cache.first_sighting("a"));
        assert!(!cache.first_sighting("a"));
        assert!(cache.first_sighting("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_forget_allows_redelivery() {
        let mut cache = EventDeduper::new(Duration::from_secs(60), 100);
        assert!(cache.first_sighting("a"));
        cache.forget("a");
        assert_eq!(cache.len(), 0);
        assert!(cache.first_sighting("a"));
    }

    #[test]
    fn test_entries_expire() {
        let mut cache = EventDeduper::new(Duration::from_secs(10), 100);
        let start = Instant::now();
        assert!(cache.first_sighting_at("a", start));
        assert!(!cache.first_sighting_at("a", start + Duration::from_secs(5)));
        assert!(cache.first_sighting_at("a", start + Duration::from_secs(11)));
    }

    #[test]
    fn test_full_cache_evicts_oldest_tenth() {
        let mut cache = EventDeduper::new(Duration::from_secs(600), 20);
        let start = Instant::now();
        for i in 0..20 {
            assert!(cache.first_sighting_at(&format!("k{i}"), start));
        }
        assert!(cache.first_sighting_at("k20", start));
        assert_eq!(cache.len(), 19);
        // k0 and k1 were evicted, so they look new again.
        assert!(cache.first_sighting_at("k0", start));
        assert!(!cache.first_sighting_at("k5", start));
    }
}
