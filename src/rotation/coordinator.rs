//! Rotation state machine.
//!
//! # Responsibilities
//! - Generate, publish, hold and finalize a new secret
//! - Restore the edge before dropping a value it may already be sending
//! - Only promote or discard a pending value this coordinator staged
//! - Refuse overlapping rotations, in-process and across processes
//! - Publish the current phase on a watch channel

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use crate::config::{RetryConfig, RotationConfig};
use crate::edge::EdgeInjector;
use crate::error::{GuardError, GuardResult};
use crate::observability::metrics;
use crate::resilience::retry_with_backoff;
use crate::rotation::{RotationPhase, RotationReport, RotationWindow, SidecarNotifier};
use crate::secret::{generate_secret, unix_now, Secret};
use crate::store::{SecretStore, StoreError};

pub struct RotationCoordinator {
    store: Arc<dyn SecretStore>,
    edge: Arc<dyn EdgeInjector>,
    notifiers: Vec<Arc<dyn SidecarNotifier>>,
    header_name: String,
    rotation: RotationConfig,
    retries: RetryConfig,
    in_flight: Mutex<()>,
    phase: watch::Sender<RotationPhase>,
}

impl RotationCoordinator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        edge: Arc<dyn EdgeInjector>,
        header_name: impl Into<String>,
        rotation: RotationConfig,
        retries: RetryConfig,
    ) -> Self {
        let (phase, _) = watch::channel(RotationPhase::Idle);
        Self {
            store,
            edge,
            notifiers: Vec::new(),
            header_name: header_name.into(),
            rotation,
            retries,
            in_flight: Mutex::new(()),
            phase,
        }
    }

    /// Add a sidecar to signal after every store change.
    pub fn with_notifier(mut self, notifier: Arc<dyn SidecarNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn phase(&self) -> RotationPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RotationPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: RotationPhase) {
        self.phase.send_replace(phase);
        metrics::record_rotation_phase(phase as u8);
        tracing::debug!(phase = phase.as_str(), "Rotation phase changed");
    }

    /// Run one full rotation.
    pub async fn rotate(&self) -> GuardResult<RotationReport> {
        let _guard = self.in_flight.try_lock().map_err(|_| {
            metrics::record_rotation("concurrent");
            GuardError::ConcurrentRotation
        })?;

        let result = self.rotate_locked().await;
        self.set_phase(RotationPhase::Idle);

        let outcome = match &result {
            Ok(report) if report.bootstrap => "bootstrap",
            Ok(_) => "completed",
            Err(GuardError::ConcurrentRotation) => "concurrent",
            Err(GuardError::PublishFailure(_)) => "publish_failed",
            Err(_) => "failed",
        };
        metrics::record_rotation(outcome);
        result
    }

    async fn rotate_locked(&self) -> GuardResult<RotationReport> {
        let discarded_stale_pending = self.clear_abandoned_pending().await?;
        let previous = self.load_current().await?;
        let bootstrap = previous.is_none();

        self.set_phase(RotationPhase::Generating);
        let secret = generate_secret(self.rotation.secret_length);

        self.set_phase(RotationPhase::Publishing);
        self.publish(&secret, previous.as_ref()).await?;

        let grace_duration = if bootstrap {
            tracing::info!("No current secret in store, installing first secret without grace");
            Duration::ZERO
        } else {
            self.rotation.grace()
        };
        let window = RotationWindow {
            started_at: unix_now(),
            grace_duration,
            pending_secret: secret,
        };

        self.set_phase(RotationPhase::Grace);
        if !grace_duration.is_zero() {
            tracing::info!(grace_secs = grace_duration.as_secs(), "Grace period started");
            tokio::time::sleep(grace_duration).await;
        }

        self.set_phase(RotationPhase::Finalizing);
        self.finalize(&window.pending_secret).await?;

        tracing::info!(bootstrap, "Rotation completed");
        Ok(RotationReport {
            window,
            bootstrap,
            discarded_stale_pending,
        })
    }

    /// A pending value left by another coordinator either means a rotation is
    /// running elsewhere (young) or one was abandoned (old).
    async fn clear_abandoned_pending(&self) -> GuardResult<bool> {
        let store = &self.store;
        let pending = retry_with_backoff(&self.retries, "store.get_pending", || async move {
            match store.get_pending().await {
                // No store yet: the first rotation provisions it.
                Err(StoreError::NotFound) => Ok(None),
                other => other,
            }
        })
        .await?;

        let Some(pending) = pending else {
            return Ok(false);
        };

        let age = pending.age_secs();
        if age < self.rotation.stale_pending_secs {
            tracing::warn!(age_secs = age, "Pending secret already staged, another rotation is in progress");
            return Err(GuardError::ConcurrentRotation);
        }

        tracing::warn!(age_secs = age, "Discarding pending secret from abandoned rotation");
        retry_with_backoff(&self.retries, "store.discard_pending", || store.discard_pending()).await?;
        self.notify_sidecars().await;
        Ok(true)
    }

    async fn load_current(&self) -> GuardResult<Option<Secret>> {
        let store = &self.store;
        let current = retry_with_backoff(&self.retries, "store.get_current", || async move {
            match store.get_current().await {
                Ok(secret) => Ok(Some(secret)),
                Err(StoreError::NotFound) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?;
        Ok(current)
    }

    async fn publish(&self, secret: &Secret, previous: Option<&Secret>) -> GuardResult<()> {
        let store = &self.store;

        retry_with_backoff(&self.retries, "store.set_pending", || async move {
            let result = store.set_pending(secret.clone()).await;
            // An earlier attempt may have landed before its reply was lost.
            if matches!(result, Err(StoreError::PendingExists)) && self.pending_is(secret).await {
                return Ok(());
            }
            result
        })
        .await?;

        if !self.owns_pending(secret).await? {
            tracing::error!("Pending slot holds another value after staging, leaving it to its owner");
            return Err(GuardError::ConcurrentRotation);
        }
        tracing::info!("Pending secret staged in store");

        self.notify_sidecars().await;

        let edge = &self.edge;
        let header = self.header_name.as_str();
        let pushed = retry_with_backoff(&self.retries, "edge.update_header", || {
            edge.update_header(header, secret.expose())
        })
        .await;

        if let Err(e) = pushed {
            tracing::error!(error = %e, "Edge never acknowledged new value");
            self.revert(secret, previous).await;
            return Err(e.into());
        }
        tracing::info!(header, "Edge acknowledged new header value");
        Ok(())
    }

    async fn pending_is(&self, secret: &Secret) -> bool {
        matches!(self.store.get_pending().await, Ok(Some(stored)) if stored == *secret)
    }

    async fn owns_pending(&self, secret: &Secret) -> GuardResult<bool> {
        let store = &self.store;
        let pending = retry_with_backoff(&self.retries, "store.get_pending", || store.get_pending()).await?;
        Ok(pending.is_some_and(|stored| stored == *secret))
    }

    /// Undo a publish the edge did not acknowledge. The edge may still have
    /// applied the new value, so the pending secret is only dropped once the
    /// edge confirms it is back on `previous`.
    async fn revert(&self, secret: &Secret, previous: Option<&Secret>) {
        let Some(previous) = previous else {
            tracing::warn!("No previous value to restore on the edge, pending secret kept");
            return;
        };

        let edge = &self.edge;
        let header = self.header_name.as_str();
        if let Err(e) = retry_with_backoff(&self.retries, "edge.restore_header", || {
            edge.update_header(header, previous.expose())
        })
        .await
        {
            tracing::error!(
                error = %e,
                "Edge restore unconfirmed, pending secret stays accepted until stale"
            );
            return;
        }
        tracing::info!(header, "Edge restored to previous header value");

        match self.owns_pending(secret).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Pending slot changed hands during revert, leaving it");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not confirm pending owner, leaving it until stale");
                return;
            }
        }

        let store = &self.store;
        match retry_with_backoff(&self.retries, "store.discard_pending", || store.discard_pending()).await {
            Ok(()) => tracing::info!("Pending secret discarded"),
            Err(e) => tracing::error!(
                error = %e,
                "Could not discard pending secret, rotation aborted; it will be cleared once stale"
            ),
        }
        self.notify_sidecars().await;
    }

    async fn finalize(&self, secret: &Secret) -> GuardResult<()> {
        if !self.owns_pending(secret).await? {
            tracing::error!("Pending secret was replaced during grace, not promoting");
            return Err(GuardError::ConcurrentRotation);
        }

        let store = &self.store;
        if let Err(e) =
            retry_with_backoff(&self.retries, "store.promote_pending", || store.promote_pending()).await
        {
            tracing::error!(
                error = %e,
                "Promotion failed, pending secret stays accepted alongside current"
            );
            return Err(e.into());
        }
        tracing::info!("Pending secret promoted, previous secret retired");
        self.notify_sidecars().await;
        Ok(())
    }

    async fn notify_sidecars(&self) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify().await {
                tracing::warn!(sidecar = %notifier.name(), error = %e, "Sidecar invalidation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{EdgeError, MemoryEdgeInjector};
    use crate::sidecar::{AcceptedSetCache, CacheVerdict};
    use crate::store::MemorySecretStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const HEADER: &str = "X-Sec-Api-Key";

    fn fast_retries() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    fn rotation(grace_secs: u64) -> RotationConfig {
        RotationConfig {
            grace_secs,
            secret_length: 32,
            ..RotationConfig::default()
        }
    }

    struct Fixture {
        store: MemorySecretStore,
        edge: MemoryEdgeInjector,
        cache: Arc<AcceptedSetCache>,
        coordinator: Arc<RotationCoordinator>,
    }

    /// Applies every update, then reports failure for the first `failures`.
    struct AppliesThenErrors {
        inner: MemoryEdgeInjector,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl EdgeInjector for AppliesThenErrors {
        async fn update_header(&self, name: &str, value: &str) -> Result<(), EdgeError> {
            self.inner.update_header(name, value).await?;
            match self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            {
                Ok(_) => Err(EdgeError::Transport("connection reset after commit".into())),
                Err(_) => Ok(()),
            }
        }
    }

    /// Holds every update until released.
    struct HeldEdge {
        inner: MemoryEdgeInjector,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl EdgeInjector for HeldEdge {
        async fn update_header(&self, name: &str, value: &str) -> Result<(), EdgeError> {
            self.release.notified().await;
            self.inner.update_header(name, value).await
        }
    }

    async fn fixture(store: MemorySecretStore, grace_secs: u64) -> Fixture {
        let edge = MemoryEdgeInjector::new();
        fixture_with_edge(store, grace_secs, edge.clone(), Arc::new(edge)).await
    }

    async fn fixture_with_edge(
        store: MemorySecretStore,
        grace_secs: u64,
        edge: MemoryEdgeInjector,
        injector: Arc<dyn EdgeInjector>,
    ) -> Fixture {
        let cache = Arc::new(AcceptedSetCache::with_timing(
            Arc::new(store.clone()),
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let _ = cache.refresh().await;
        let coordinator = RotationCoordinator::new(
            Arc::new(store.clone()),
            injector,
            HEADER,
            rotation(grace_secs),
            fast_retries(),
        )
        .with_notifier(cache.clone());

        Fixture {
            store,
            edge,
            cache,
            coordinator: Arc::new(coordinator),
        }
    }

    #[tokio::test]
    async fn test_rotation_retires_old_secret() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 0).await;

        let report = f.coordinator.rotate().await.unwrap();
        let new_value = report.window.pending_secret.expose().to_string();

        assert!(!report.bootstrap);
        assert_eq!(f.store.get_current().await.unwrap().expose(), new_value);
        assert!(f.store.get_pending().await.unwrap().is_none());
        assert_eq!(f.edge.current_value(HEADER).as_deref(), Some(new_value.as_str()));
        assert_eq!(f.cache.check(&new_value).await, CacheVerdict::Accepted);
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Rejected);
        assert_eq!(f.coordinator.phase(), RotationPhase::Idle);
    }

    #[tokio::test]
    async fn test_both_values_accepted_during_grace() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 1).await;
        let mut phases = f.coordinator.subscribe();

        let coordinator = f.coordinator.clone();
        let rotation = tokio::spawn(async move { coordinator.rotate().await });

        phases
            .wait_for(|p| *p == RotationPhase::Grace)
            .await
            .unwrap();
        let new_value = f.edge.current_value(HEADER).unwrap();
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Accepted);
        assert_eq!(f.cache.check(&new_value).await, CacheVerdict::Accepted);

        rotation.await.unwrap().unwrap();
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Rejected);
        assert_eq!(f.cache.check(&new_value).await, CacheVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_overlapping_rotation_refused() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 1).await;
        let mut phases = f.coordinator.subscribe();

        let coordinator = f.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.rotate().await });
        phases
            .wait_for(|p| *p == RotationPhase::Grace)
            .await
            .unwrap();

        assert!(matches!(
            f.coordinator.rotate().await,
            Err(GuardError::ConcurrentRotation)
        ));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_young_pending_in_store_is_concurrent() {
        let store = MemorySecretStore::with_current("abc123");
        store.set_pending(Secret::new("other-rotation")).await.unwrap();
        let f = fixture(store, 0).await;

        assert!(matches!(
            f.coordinator.rotate().await,
            Err(GuardError::ConcurrentRotation)
        ));
        assert_eq!(f.edge.attempts(), 0);
        assert_eq!(
            f.store.get_pending().await.unwrap().unwrap().expose(),
            "other-rotation"
        );
    }

    #[tokio::test]
    async fn test_stale_pending_is_discarded() {
        let store = MemorySecretStore::with_current("abc123");
        let old = unix_now() - 2 * RotationConfig::default().stale_pending_secs;
        store
            .set_pending(Secret::with_created_at("abandoned", old))
            .await
            .unwrap();
        let f = fixture(store, 0).await;

        let report = f.coordinator.rotate().await.unwrap();
        assert!(report.discarded_stale_pending);
        assert_eq!(f.cache.check("abandoned").await, CacheVerdict::Rejected);
    }

    #[tokio::test]
    async fn test_edge_failure_restores_previous_then_discards() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 0).await;
        f.edge.fail_next_updates(3);

        let err = f.coordinator.rotate().await.unwrap_err();
        assert!(matches!(err, GuardError::PublishFailure(_)));
        assert_eq!(f.edge.attempts(), 4);
        assert_eq!(f.edge.current_value(HEADER).as_deref(), Some("abc123"));

        assert!(f.store.get_pending().await.unwrap().is_none());
        assert_eq!(f.store.get_current().await.unwrap().expose(), "abc123");
        assert_eq!(f.cache.snapshot().len(), 1);
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_unreachable_edge_keeps_pending() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 0).await;
        f.edge.set_available(false);

        let err = f.coordinator.rotate().await.unwrap_err();
        assert!(matches!(err, GuardError::PublishFailure(_)));
        // Three pushes of the new value, three restore attempts.
        assert_eq!(f.edge.attempts(), 6);

        let pending = f.store.get_pending().await.unwrap().unwrap();
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Accepted);
        assert_eq!(f.cache.check(pending.expose()).await, CacheVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_edge_applying_despite_error_stays_accepted() {
        let edge = MemoryEdgeInjector::new();
        let injector = Arc::new(AppliesThenErrors {
            inner: edge.clone(),
            failures: AtomicUsize::new(usize::MAX),
        });
        let f = fixture_with_edge(MemorySecretStore::with_current("abc123"), 0, edge, injector).await;

        let err = f.coordinator.rotate().await.unwrap_err();
        assert!(matches!(err, GuardError::PublishFailure(_)));

        // The restore never acknowledged either, so the new value is kept.
        let pending = f.store.get_pending().await.unwrap().unwrap();
        assert_eq!(f.cache.check(pending.expose()).await, CacheVerdict::Accepted);
        let sent = f.edge.current_value(HEADER).unwrap();
        assert_eq!(f.cache.check(&sent).await, CacheVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_edge_applying_new_value_then_restored() {
        let edge = MemoryEdgeInjector::new();
        let injector = Arc::new(AppliesThenErrors {
            inner: edge.clone(),
            failures: AtomicUsize::new(3),
        });
        let f = fixture_with_edge(MemorySecretStore::with_current("abc123"), 0, edge, injector).await;

        let err = f.coordinator.rotate().await.unwrap_err();
        assert!(matches!(err, GuardError::PublishFailure(_)));

        assert_eq!(f.edge.current_value(HEADER).as_deref(), Some("abc123"));
        assert!(f.store.get_pending().await.unwrap().is_none());
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_bootstrap_edge_failure_keeps_pending() {
        let f = fixture(MemorySecretStore::new(), 0).await;
        f.edge.set_available(false);

        let err = f.coordinator.rotate().await.unwrap_err();
        assert!(matches!(err, GuardError::PublishFailure(_)));
        assert_eq!(f.edge.attempts(), 3);
        assert!(f.store.get_pending().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rotation_refused_while_publishing() {
        let edge = MemoryEdgeInjector::new();
        let release = Arc::new(Notify::new());
        let injector = Arc::new(HeldEdge {
            inner: edge.clone(),
            release: release.clone(),
        });
        let f = fixture_with_edge(MemorySecretStore::with_current("abc123"), 0, edge, injector).await;
        let mut phases = f.coordinator.subscribe();

        let coordinator = f.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.rotate().await });
        phases
            .wait_for(|p| *p == RotationPhase::Publishing)
            .await
            .unwrap();

        assert!(matches!(
            f.coordinator.rotate().await,
            Err(GuardError::ConcurrentRotation)
        ));
        assert_eq!(f.edge.update_count(), 0);

        release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(
            f.store.get_current().await.unwrap().expose(),
            report.window.pending_secret.expose()
        );
    }

    #[tokio::test]
    async fn test_replaced_pending_is_not_promoted() {
        let store = MemorySecretStore::with_current("abc123");
        let f = fixture(store.clone(), 1).await;
        let mut phases = f.coordinator.subscribe();

        // A second rotator that treats any pending value as abandoned.
        let other = RotationCoordinator::new(
            Arc::new(store.clone()),
            Arc::new(MemoryEdgeInjector::new()),
            HEADER,
            RotationConfig {
                stale_pending_secs: 0,
                ..rotation(0)
            },
            fast_retries(),
        );

        let coordinator = f.coordinator.clone();
        let first = tokio::spawn(async move { coordinator.rotate().await });
        phases
            .wait_for(|p| *p == RotationPhase::Grace)
            .await
            .unwrap();

        let report = other.rotate().await.unwrap();
        assert!(report.discarded_stale_pending);
        let theirs = report.window.pending_secret.expose().to_string();

        assert!(matches!(
            first.await.unwrap(),
            Err(GuardError::ConcurrentRotation)
        ));
        assert_eq!(store.get_current().await.unwrap().expose(), theirs);
        assert!(store.get_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_edge_failure_is_retried() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 0).await;
        f.edge.fail_next_updates(2);

        assert!(f.coordinator.rotate().await.is_ok());
        assert_eq!(f.edge.attempts(), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_without_current() {
        let f = fixture(MemorySecretStore::new(), 300).await;

        let report = tokio::time::timeout(Duration::from_secs(5), f.coordinator.rotate())
            .await
            .unwrap()
            .unwrap();
        assert!(report.bootstrap);
        assert!(report.window.grace_duration.is_zero());

        let value = report.window.pending_secret.expose().to_string();
        assert_eq!(f.store.get_current().await.unwrap().expose(), value);
        assert_eq!(f.cache.check(&value).await, CacheVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_store_outage_aborts_before_edge() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 0).await;
        f.store.set_available(false);

        assert!(matches!(
            f.coordinator.rotate().await,
            Err(GuardError::StoreUnavailable(_))
        ));
        assert_eq!(f.edge.attempts(), 0);
    }

    #[tokio::test]
    async fn test_failed_promotion_keeps_both_accepted() {
        let f = fixture(MemorySecretStore::with_current("abc123"), 1).await;
        let mut phases = f.coordinator.subscribe();

        let coordinator = f.coordinator.clone();
        let store = f.store.clone();
        let rotation = tokio::spawn(async move { coordinator.rotate().await });

        // Promotion is the only write left once grace is reached.
        phases
            .wait_for(|p| *p == RotationPhase::Grace)
            .await
            .unwrap();
        store.fail_next_writes(3);

        let result = rotation.await.unwrap();
        assert!(matches!(result, Err(GuardError::StoreUnavailable(_))));
        assert!(f.store.get_pending().await.unwrap().is_some());
        assert_eq!(f.cache.check("abc123").await, CacheVerdict::Accepted);
    }
}
