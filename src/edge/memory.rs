//! In-process edge injector.
//!
//! Records every applied value and tracks which value the edge is "sending".
//! Failures can be injected to exercise the coordinator's revert path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::edge::{EdgeError, EdgeInjector};

#[derive(Clone, Default)]
pub struct MemoryEdgeInjector {
    applied: Arc<RwLock<Vec<(String, String)>>>,
    unavailable: Arc<AtomicBool>,
    failing_updates: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryEdgeInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Fail the next `count` updates.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// Calls made so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Value the edge currently sends for `name`.
    pub fn current_value(&self, name: &str) -> Option<String> {
        let applied = self.applied.read().ok()?;
        applied
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Number of successful updates.
    pub fn update_count(&self) -> usize {
        self.applied.read().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EdgeInjector for MemoryEdgeInjector {
    async fn update_header(&self, name: &str, value: &str) -> Result<(), EdgeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EdgeError::Unavailable);
        }
        let injected = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(EdgeError::Unavailable);
        }

        let mut applied = self
            .applied
            .write()
            .map_err(|_| EdgeError::Io("edge state lock poisoned".into()))?;
        applied.push((name.to_string(), value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_latest_value() {
        let edge = MemoryEdgeInjector::new();
        edge.update_header("X-Sec-Api-Key", "abc123").await.unwrap();
        edge.update_header("x-sec-api-key", "xyz789").await.unwrap();
        assert_eq!(edge.current_value("X-SEC-API-KEY").as_deref(), Some("xyz789"));
        assert_eq!(edge.update_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let edge = MemoryEdgeInjector::new();
        edge.fail_next_updates(1);
        assert!(edge.update_header("X-Sec-Api-Key", "a").await.is_err());
        assert!(edge.update_header("X-Sec-Api-Key", "a").await.is_ok());
        assert_eq!(edge.attempts(), 2);
        assert_eq!(edge.update_count(), 1);
    }
}
