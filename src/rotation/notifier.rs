//! Invalidation signals from the coordinator to sidecars.
//!
//! A lost signal is not fatal: sidecars also refresh on a timer and on a
//! cache miss, so notification failures are logged and rotation continues.

use async_trait::async_trait;

use crate::gate::SidecarClient;
use crate::sidecar::AcceptedSetCache;

#[async_trait]
pub trait SidecarNotifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> String;

    /// Ask the sidecar to reload its accepted set from the store.
    async fn notify(&self) -> Result<(), String>;
}

/// In-process sidecar: reload the cache directly.
#[async_trait]
impl SidecarNotifier for AcceptedSetCache {
    fn name(&self) -> String {
        "in-process".to_string()
    }

    async fn notify(&self) -> Result<(), String> {
        self.refresh().await.map_err(|e| e.to_string())
    }
}

/// Sidecar reached over loopback HTTP (`POST /refresh`).
pub struct HttpSidecarNotifier {
    client: SidecarClient,
    label: String,
}

impl HttpSidecarNotifier {
    pub fn new(client: SidecarClient, label: impl Into<String>) -> Self {
        Self {
            client,
            label: label.into(),
        }
    }
}

#[async_trait]
impl SidecarNotifier for HttpSidecarNotifier {
    fn name(&self) -> String {
        self.label.clone()
    }

    async fn notify(&self) -> Result<(), String> {
        self.client.refresh().await.map_err(|e| e.to_string())
    }
}
