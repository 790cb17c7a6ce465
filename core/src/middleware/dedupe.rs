//! Time-windowed duplicate suppression by key.
//!
//! A best-effort, bounded-memory approximation of deduplication: a key is
//! never allowed twice within one TTL measured from its first sighting, but
//! it is allowed again once evicted, and the set does not survive a restart.

use crate::config::MessagingConfig;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// In-memory set of recently seen keys.
///
/// Every call to [`Dedupe::allow`] evicts expired keys, checks membership and
/// records the key as one critical section, so concurrent callers can never
/// both observe a first sighting of the same key.
///
/// # Example
///
/// ```
/// use tenant_messaging_core::middleware::Dedupe;
/// use std::time::Duration;
///
/// let dedupe = Dedupe::new(Duration::from_secs(60));
/// assert!(dedupe.allow("req-1"));
/// assert!(!dedupe.allow("req-1"));
/// ```
#[derive(Debug)]
pub struct Dedupe {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl Dedupe {
    /// Create an empty dedupe set with the given window.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Create an empty dedupe set with the configured `DEDUPE_TTL_MS` window.
    #[must_use]
    pub fn from_config(config: &MessagingConfig) -> Self {
        Self::new(config.dedupe_ttl)
    }

    /// Returns `true` on the first sighting of `key` within the window and
    /// `false` for every repeat until the key ages out.
    pub fn allow(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        // Linear scan; the working set is expected to stay small.
        seen.retain(|_, first_seen| now.duration_since(*first_seen) <= self.ttl);

        if seen.contains_key(key) {
            tracing::trace!(key, "Duplicate key within dedupe window");
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }

    /// Number of keys currently tracked, including any not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[tokio::test(start_paused = true)]
    async fn repeats_are_rejected_within_window() {
        let dedupe = Dedupe::new(Duration::from_secs(10));
        assert!(dedupe.allow("k"));
        assert!(!dedupe.allow("k"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!dedupe.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn key_is_allowed_again_after_ttl() {
        let dedupe = Dedupe::new(Duration::from_secs(10));
        assert!(dedupe.allow("k"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(dedupe.allow("k"));
        assert!(!dedupe.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_measured_from_first_sighting() {
        let dedupe = Dedupe::new(Duration::from_secs(10));
        assert!(dedupe.allow("k"));

        // Rejected repeats do not refresh the timestamp.
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!dedupe.allow("k"));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(dedupe.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_evicted_on_any_call() {
        let dedupe = Dedupe::new(Duration::from_secs(1));
        assert!(dedupe.allow("a"));
        assert!(dedupe.allow("b"));
        assert_eq!(dedupe.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(dedupe.allow("c"));
        assert_eq!(dedupe.len(), 1);
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let dedupe = Dedupe::new(Duration::from_secs(60));
        assert!(dedupe.is_empty());
        assert!(dedupe.allow("a"));
        assert!(dedupe.allow("b"));
        assert!(!dedupe.allow("a"));
        assert_eq!(dedupe.ttl(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_window_is_applied() {
        let config = MessagingConfig::from_lookup(|key| {
            (key == "DEDUPE_TTL_MS").then(|| "250".to_string())
        })
        .unwrap();
        let dedupe = Dedupe::from_config(&config);
        assert_eq!(dedupe.ttl(), Duration::from_millis(250));

        assert!(dedupe.allow("k"));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!dedupe.allow("k"));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(dedupe.allow("k"));
    }

    #[test]
    fn concurrent_first_sightings_allow_exactly_one() {
        const CALLERS: usize = 32;
        let dedupe = Arc::new(Dedupe::new(Duration::from_secs(60)));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let dedupe = Arc::clone(&dedupe);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    dedupe.allow("k")
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 1);
    }
}
