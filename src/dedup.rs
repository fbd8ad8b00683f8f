//! Time-windowed deduplication store.
//!
//! A key is reported as new the first time it is seen and as a duplicate for
//! the rest of a fixed window. Repeat sightings never extend the window, so
//! insertion order is expiry order and a single FIFO of deadlines is enough
//! to evict everything: expired heads are purged on every check, and a
//! background sweep purges them during quiet periods.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::MAX_DEDUP_WINDOW_SECS;

#[derive(Debug, Default)]
struct Entries {
    deadlines: HashMap<String, Instant>,
    expiry: VecDeque<(Instant, String)>,
}

impl Entries {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        while let Some((deadline, _)) = self.expiry.front() {
            if *deadline > now {
                break;
            }
            if let Some((_, key)) = self.expiry.pop_front() {
                debug!(key = %key, "Discarding old id");
                self.deadlines.remove(&key);
                purged += 1;
            }
        }
        purged
    }
}

/// Shared store of recently seen keys. Cloning shares the same entries.
#[derive(Debug, Clone)]
pub struct DedupStore {
    window: Duration,
    entries: Arc<Mutex<Entries>>,
}

impl DedupStore {
    /// Windows longer than a year are clamped to one year.
    pub fn new(window: Duration) -> Self {
        let max = Duration::from_secs(MAX_DEDUP_WINDOW_SECS);
        if window > max {
            warn!(requested = ?window, "Dedup window too long, clamping to one year");
        }
        Self {
            window: window.min(max),
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Entries stay consistent even if a holder panicked mid-purge
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `key` and report whether it was already present.
    ///
    /// Returns `false` on the first sighting within the window (forward the
    /// event) and `true` for every later sighting until the window elapses.
    pub fn check_and_store(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.purge_expired(now);

        if entries.deadlines.contains_key(key) {
            return true;
        }

        // bounded by the clamp in `new`
        let deadline = now + self.window;
        entries.deadlines.insert(key.to_string(), deadline);
        entries.expiry.push_back((deadline, key.to_string()));
        false
    }

    /// Drop every expired key, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Number of keys currently held (expired keys count until swept).
    pub fn len(&self) -> usize {
        self.lock().deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`sweep`](Self::sweep) every `interval` for the life of the runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.sweep();
                if purged > 0 {
                    debug!(purged, remaining = store.len(), "Swept expired dedup keys");
                }
                crate::metrics::DedupMetrics::record_store_size(store.len());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(600);

    #[tokio::test(start_paused = true)]
    async fn test_first_sighting_then_duplicates() {
        let store = DedupStore::new(WINDOW);
        assert!(!store.check_and_store("5:111"));
        assert!(store.check_and_store("5:111"));
        assert!(store.check_and_store("5:111"));
        assert!(!store.check_and_store("-1:900"));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_is_new_again_after_window() {
        let store = DedupStore::new(WINDOW);
        assert!(!store.check_and_store("k"));

        tokio::time::advance(WINDOW - Duration::from_secs(1)).await;
        assert!(store.check_and_store("k"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!store.check_and_store("k"));
        assert!(store.check_and_store("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_sightings_do_not_renew() {
        let store = DedupStore::new(WINDOW);
        assert!(!store.check_and_store("k"));
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(store.check_and_store("k"));
        tokio::time::advance(Duration::from_secs(300)).await;
        // expiry counts from the first sighting, not the repeat
        assert!(!store.check_and_store("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_window_is_clamped() {
        let store = DedupStore::new(Duration::MAX);
        assert_eq!(store.window(), Duration::from_secs(MAX_DEDUP_WINDOW_SECS));
        assert!(!store.check_and_store("k"));
        assert!(store.check_and_store("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_only_expired() {
        let store = DedupStore::new(WINDOW);
        store.check_and_store("old");
        tokio::time::advance(Duration::from_secs(400)).await;
        store.check_and_store("young");
        tokio::time::advance(Duration::from_secs(200)).await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.check_and_store("young"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_bounds_memory() {
        let store = DedupStore::new(Duration::from_secs(10));
        let sweeper = store.spawn_sweeper(Duration::from_secs(1));
        for i in 0..50 {
            store.check_and_store(&format!("key-{}", i));
        }
        assert_eq!(store.len(), 50);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(store.is_empty());
        sweeper.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_sightings_resolve_to_one() {
        let store = DedupStore::new(WINDOW);
        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                store.check_and_store("same")
            }));
        }

        let mut firsts = 0;
        let mut duplicates = 0;
        for handle in handles {
            if handle.await.unwrap() {
                duplicates += 1;
            } else {
                firsts += 1;
            }
        }
        assert_eq!(firsts, 1);
        assert_eq!(duplicates, 15);
    }
}
