//! In-process secret store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::secret::Secret;
use crate::store::{SecretStore, StoreError};

#[derive(Default)]
struct Slots {
    current: Option<Secret>,
    pending: Option<Secret>,
}

/// A secret store held in memory.
///
/// Cloning shares the same slots. Availability can be toggled to exercise the
/// degraded paths of the sidecar and the coordinator.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    slots: Arc<RwLock<Slots>>,
    unavailable: Arc<AtomicBool>,
    /// Remaining writes that fail before writes succeed again.
    failing_writes: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a current value.
    pub fn with_current(value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut slots) = store.slots.write() {
            slots.current = Some(Secret::new(value));
        }
        store
    }

    /// Simulate an outage: every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of read calls served (current + pending).
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        self.check_available()?;
        let failed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }

    fn lock_err() -> StoreError {
        StoreError::Unavailable("memory store lock poisoned".into())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_current(&self) -> Result<Secret, StoreError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let slots = self.slots.read().map_err(|_| Self::lock_err())?;
        slots.current.clone().ok_or(StoreError::NotFound)
    }

    async fn get_pending(&self) -> Result<Option<Secret>, StoreError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let slots = self.slots.read().map_err(|_| Self::lock_err())?;
        Ok(slots.pending.clone())
    }

    async fn set_pending(&self, secret: Secret) -> Result<(), StoreError> {
        self.check_write()?;
        let mut slots = self.slots.write().map_err(|_| Self::lock_err())?;
        if slots.pending.is_some() {
            return Err(StoreError::PendingExists);
        }
        slots.pending = Some(secret);
        Ok(())
    }

    async fn promote_pending(&self) -> Result<(), StoreError> {
        self.check_write()?;
        let mut slots = self.slots.write().map_err(|_| Self::lock_err())?;
        let pending = slots.pending.take().ok_or(StoreError::NoPending)?;
        slots.current = Some(pending);
        Ok(())
    }

    async fn discard_pending(&self) -> Result<(), StoreError> {
        self.check_write()?;
        let mut slots = self.slots.write().map_err(|_| Self::lock_err())?;
        slots.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_lifecycle() {
        let store = MemorySecretStore::with_current("abc123");
        assert_eq!(store.get_current().await.unwrap().expose(), "abc123");
        assert!(store.get_pending().await.unwrap().is_none());

        store.set_pending(Secret::new("xyz789")).await.unwrap();
        assert!(matches!(
            store.set_pending(Secret::new("other")).await,
            Err(StoreError::PendingExists)
        ));

        store.promote_pending().await.unwrap();
        assert_eq!(store.get_current().await.unwrap().expose(), "xyz789");
        assert!(store.get_pending().await.unwrap().is_none());
        assert!(matches!(store.promote_pending().await, Err(StoreError::NoPending)));
    }

    #[tokio::test]
    async fn test_discard_keeps_current() {
        let store = MemorySecretStore::with_current("abc123");
        store.set_pending(Secret::new("xyz789")).await.unwrap();
        store.discard_pending().await.unwrap();
        assert_eq!(store.get_current().await.unwrap().expose(), "abc123");
        assert!(store.get_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outage_and_injected_failures() {
        let store = MemorySecretStore::with_current("abc123");
        store.set_available(false);
        assert!(matches!(store.get_current().await, Err(StoreError::Unavailable(_))));
        store.set_available(true);

        store.fail_next_writes(1);
        assert!(store.set_pending(Secret::new("xyz789")).await.is_err());
        assert!(store.set_pending(Secret::new("xyz789")).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_store_has_no_current() {
        let store = MemorySecretStore::new();
        assert!(matches!(store.get_current().await, Err(StoreError::NotFound)));
    }
}
