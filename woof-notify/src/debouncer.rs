//! Per-dog notification debouncing with a bounded LRU of tracked keys.
//!
//! Grounded on `NotificationDebouncer` in the original Python
//! `events/debouncer.py`, which keeps an `OrderedDict` so the oldest entry
//! can be evicted in O(1) once more than `MAX_TRACKED_DOGS` keys are seen.
//! Rust's std has no ordered map with that property, so we pair a
//! `HashMap` for lookups with an explicit `VecDeque` recency list.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

const MAX_TRACKED: usize = 1000;
const UNKNOWN_DOG_KEY: &str = "__unknown__";

#[derive(Debug, Clone, Copy)]
pub struct DebouncerStats {
    pub tracked_keys: usize,
    pub max_tracked: usize,
    pub total_checked: u64,
    pub total_debounced: u64,
    pub debounce_seconds: u32,
}

pub struct Debouncer {
    debounce_seconds: u32,
    last_notification: Mutex<HashMap<String, DateTime<Utc>>>,
    recency: Mutex<VecDeque<String>>,
    total_checked: AtomicU64,
    total_debounced: AtomicU64,
}

impl Debouncer {
    pub fn new(debounce_seconds: u32) -> Self {
        Debouncer {
            debounce_seconds,
            last_notification: Mutex::new(HashMap::new()),
            recency: Mutex::new(VecDeque::new()),
            total_checked: AtomicU64::new(0),
            total_debounced: AtomicU64::new(0),
        }
    }

    /// Returns `true` if a notification for `dog_id` at `timestamp` should
    /// go out, recording the timestamp as the most recent one seen either
    /// way. Barks with no dog attribution share a single `__unknown__` key.
    pub fn should_notify(&self, dog_id: Option<&str>, timestamp: DateTime<Utc>) -> bool {
        self.total_checked.fetch_add(1, Ordering::Relaxed);
        let key = dog_id.unwrap_or(UNKNOWN_DOG_KEY);

        let mut last = self.last_notification.lock().unwrap();
        if let Some(prev) = last.get(key) {
            let elapsed = (timestamp - *prev).num_seconds();
            if elapsed < self.debounce_seconds as i64 {
                self.total_debounced.fetch_add(1, Ordering::Relaxed);
                self.touch(key);
                return false;
            }
        }

        let is_new_key = !last.contains_key(key);
        last.insert(key.to_string(), timestamp);
        drop(last);

        self.touch(key);
        if is_new_key {
            self.evict_if_over_capacity();
        }
        true
    }

    fn touch(&self, key: &str) {
        let mut recency = self.recency.lock().unwrap();
        if let Some(pos) = recency.iter().position(|k| k == key) {
            recency.remove(pos);
        }
        recency.push_back(key.to_string());
    }

    fn evict_if_over_capacity(&self) {
        let mut recency = self.recency.lock().unwrap();
        if recency.len() <= MAX_TRACKED {
            return;
        }
        if let Some(oldest) = recency.pop_front() {
            self.last_notification.lock().unwrap().remove(&oldest);
            log::debug!("debouncer_evicted_lru key={oldest}");
        }
    }

    pub fn stats(&self) -> DebouncerStats {
        DebouncerStats {
            tracked_keys: self.last_notification.lock().unwrap().len(),
            max_tracked: MAX_TRACKED,
            total_checked: self.total_checked.load(Ordering::Relaxed),
            total_debounced: self.total_debounced.load(Ordering::Relaxed),
            debounce_seconds: self.debounce_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn first_notification_always_allowed() {
        let debouncer = Debouncer::new(300);
        assert!(debouncer.should_notify(Some("rex"), Utc::now()));
    }

    #[test]
    fn second_notification_within_window_is_debounced() {
        let debouncer = Debouncer::new(300);
        let t0 = Utc::now();
        assert!(debouncer.should_notify(Some("rex"), t0));
        assert!(!debouncer.should_notify(Some("rex"), t0 + Duration::seconds(100)));
    }

    #[test]
    fn notification_after_window_elapses_is_allowed() {
        let debouncer = Debouncer::new(300);
        let t0 = Utc::now();
        assert!(debouncer.should_notify(Some("rex"), t0));
        assert!(debouncer.should_notify(Some("rex"), t0 + Duration::seconds(301)));
    }

    #[test]
    fn unknown_dogs_share_a_single_key() {
        let debouncer = Debouncer::new(300);
        let t0 = Utc::now();
        assert!(debouncer.should_notify(None, t0));
        assert!(!debouncer.should_notify(None, t0 + Duration::seconds(1)));
        assert_eq!(debouncer.stats().tracked_keys, 1);
    }

    #[test]
    fn exceeding_capacity_evicts_the_least_recently_used_key() {
        let debouncer = Debouncer::new(300);
        let t0 = Utc::now();
        for i in 0..MAX_TRACKED {
            let id = format!("dog-{i}");
            assert!(debouncer.should_notify(Some(&id), t0));
        }
        assert_eq!(debouncer.stats().tracked_keys, MAX_TRACKED);

        assert!(debouncer.should_notify(Some("dog-new"), t0));
        let stats = debouncer.stats();
        assert_eq!(stats.tracked_keys, MAX_TRACKED);

        // dog-0 was least recently used and should have been evicted, so a
        // fresh notification for it is allowed again immediately.
        assert!(debouncer.should_notify(Some("dog-0"), t0 + Duration::seconds(1)));
    }
}
