//! Edge injector subsystem.
//!
//! The edge layer is trusted to hold the secret in plaintext; the channel used
//! to update it (local file permissions, HTTPS + bearer token) is what keeps
//! it private.
//!
//! # Contract
//! After `update_header` returns `Ok`, newly originated edge requests carry
//! the new value. Requests already in flight may carry the old value for up to
//! the configured propagation delay.

pub mod distribution;
pub mod memory;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{EdgeConfig, EdgeKind};

pub use distribution::{DistributionConfig, FileEdgeInjector};
pub use memory::MemoryEdgeInjector;
pub use webhook::WebhookEdgeInjector;

#[derive(Debug, Error)]
pub enum EdgeError {
    /// No origin declares the header, so nothing would carry the new value.
    #[error("no origin declares header {0}")]
    HeaderNotDeclared(String),

    /// The config changed underneath us.
    #[error("edge config changed concurrently (etag {expected} != {found})")]
    Conflict { expected: String, found: String },

    #[error("edge config io error: {0}")]
    Io(String),

    #[error("edge config endpoint rejected update with status {0}")]
    Rejected(u16),

    #[error("edge config endpoint unreachable: {0}")]
    Transport(String),

    #[error("edge injector unavailable")]
    Unavailable,
}

/// Contract of the edge layer's forwarding configuration.
#[async_trait]
pub trait EdgeInjector: Send + Sync {
    /// Make the edge send `name: value` on requests toward the origin.
    async fn update_header(&self, name: &str, value: &str) -> Result<(), EdgeError>;
}

/// Build the injector selected in configuration.
pub fn from_config(config: &EdgeConfig) -> Result<Arc<dyn EdgeInjector>, EdgeError> {
    match config.kind {
        EdgeKind::File => Ok(Arc::new(FileEdgeInjector::new(&config.distribution_path))),
        EdgeKind::Webhook => Ok(Arc::new(WebhookEdgeInjector::from_config(config)?)),
    }
}
