//! Accepted-set cache.
//!
//! # Responsibilities
//! - Hold the current accepted set as an immutable snapshot
//! - Refresh on an interval, on invalidation, and on a miss after a cooldown
//! - Keep serving the last-known set when the store is unreachable
//!
//! # Design Decisions
//! - Readers load the snapshot lock-free (`ArcSwap`); a refresh swaps a whole
//!   new set in, so nobody observes a half-updated set
//! - Refreshes are serialized; concurrent misses coalesce into one store read
//! - "Cannot verify" is never "accept"

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, Notify};

use crate::config::SidecarConfig;
use crate::observability::metrics;
use crate::secret::AcceptedSet;
use crate::store::{SecretStore, StoreError};

const NEVER: u64 = u64::MAX;

/// Result of matching a candidate against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    Accepted,
    Rejected,
    /// No set has ever been loaded.
    Unavailable,
}

pub struct AcceptedSetCache {
    store: Arc<dyn SecretStore>,
    snapshot: ArcSwap<AcceptedSet>,
    loaded: AtomicBool,
    degraded: AtomicBool,
    /// Bumped on every successful refresh.
    generation: AtomicU64,
    /// Milliseconds since `epoch` of the last refresh attempt.
    last_attempt_ms: AtomicU64,
    epoch: Instant,
    refresh_lock: Mutex<()>,
    invalidated: Notify,
    comparisons: AtomicU64,
    refresh_interval: Duration,
    miss_cooldown: Duration,
}

impl AcceptedSetCache {
    pub fn new(store: Arc<dyn SecretStore>, config: &SidecarConfig) -> Self {
        Self::with_timing(store, config.refresh_interval(), config.miss_refresh_cooldown())
    }

    pub fn with_timing(
        store: Arc<dyn SecretStore>,
        refresh_interval: Duration,
        miss_cooldown: Duration,
    ) -> Self {
        Self {
            store,
            snapshot: ArcSwap::from_pointee(AcceptedSet::default()),
            loaded: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            last_attempt_ms: AtomicU64::new(NEVER),
            epoch: Instant::now(),
            refresh_lock: Mutex::new(()),
            invalidated: Notify::new(),
            comparisons: AtomicU64::new(0),
            refresh_interval,
            miss_cooldown,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<AcceptedSet> {
        self.snapshot.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Total secret comparisons performed. Instrumentation for tests.
    pub fn comparisons(&self) -> u64 {
        self.comparisons.load(Ordering::Relaxed)
    }

    /// Ask the refresh loop to reload as soon as possible.
    pub fn invalidate(&self) {
        self.invalidated.notify_one();
    }

    /// Reload the accepted set from the store.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<(), StoreError> {
        self.last_attempt_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Release);

        match self.fetch().await {
            Ok(set) => {
                let size = set.len();
                let in_rotation = set.in_rotation();
                self.snapshot.store(Arc::new(set));
                self.loaded.store(true, Ordering::Release);
                if self.degraded.swap(false, Ordering::AcqRel) {
                    tracing::info!("Secret store reachable again, accepted set refreshed");
                }
                self.generation.fetch_add(1, Ordering::AcqRel);

                tracing::debug!(accepted_values = size, in_rotation, "Accepted set refreshed");
                metrics::record_refresh("ok");
                metrics::record_accepted_set(size, false);
                Ok(())
            }
            Err(e) => {
                metrics::record_refresh("error");
                if self.is_loaded() {
                    self.degraded.store(true, Ordering::Release);
                    tracing::warn!(
                        error = %e,
                        "Secret store refresh failed, serving last-known accepted set (degraded)"
                    );
                    metrics::record_accepted_set(self.snapshot.load().len(), true);
                } else {
                    tracing::error!(error = %e, "Secret store refresh failed, no accepted set loaded");
                }
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<AcceptedSet, StoreError> {
        let current = match self.store.get_current().await {
            Ok(secret) => Some(secret),
            // Bootstrap: a first rotation may have staged pending only.
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e),
        };
        let pending = self.store.get_pending().await?;
        if current.is_none() && pending.is_none() {
            // Nothing provisioned yet.
            return Err(StoreError::NotFound);
        }
        Ok(AcceptedSet::new(current, pending))
    }

    fn cooldown_elapsed(&self) -> bool {
        let last = self.last_attempt_ms.load(Ordering::Acquire);
        if last == NEVER {
            return true;
        }
        let now = self.epoch.elapsed().as_millis() as u64;
        now.saturating_sub(last) >= self.miss_cooldown.as_millis() as u64
    }

    /// Refresh unless another task already did since `seen_generation`.
    async fn refresh_after_miss(&self, seen_generation: u64) {
        let _guard = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::Acquire) != seen_generation || !self.cooldown_elapsed() {
            return;
        }
        tracing::debug!("Candidate missed cached set, refreshing from store");
        // Errors are already logged; the stale set keeps serving.
        let _ = self.refresh_locked().await;
    }

    fn compare(&self, candidate: &str) -> bool {
        let snapshot = self.snapshot.load();
        let (hit, compared) = snapshot.matches(candidate);
        self.comparisons.fetch_add(compared as u64, Ordering::Relaxed);
        hit
    }

    /// Match `candidate` against the accepted set.
    pub async fn check(&self, candidate: &str) -> CacheVerdict {
        if self.compare(candidate) {
            return CacheVerdict::Accepted;
        }

        if self.cooldown_elapsed() {
            let seen = self.generation.load(Ordering::Acquire);
            self.refresh_after_miss(seen).await;
            if self.compare(candidate) {
                return CacheVerdict::Accepted;
            }
        }

        if self.is_loaded() {
            CacheVerdict::Rejected
        } else {
            CacheVerdict::Unavailable
        }
    }

    /// Refresh loop. Runs until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.refresh_interval.as_secs(),
            "Accepted-set refresh loop starting"
        );

        let start = tokio::time::Instant::now() + self.refresh_interval;
        let mut ticker = tokio::time::interval_at(start, self.refresh_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.refresh().await;
                }
                _ = self.invalidated.notified() => {
                    tracing::info!("Invalidation received, refreshing accepted set");
                    let _ = self.refresh().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Refresh loop received shutdown signal, exiting");
                    break;
                }
            }
        }
    }
}
