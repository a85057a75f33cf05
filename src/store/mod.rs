//! Secret store subsystem.
//!
//! # Data Flow
//! ```text
//! Rotation coordinator
//!     → set_pending / promote_pending / discard_pending
//! Sidecar refresh
//!     → get_current / get_pending
//! watcher.rs
//!     → file changed on disk → sidecar invalidation
//! ```
//!
//! # Design Decisions
//! - The store is the single source of truth; sidecars never take values
//!   from the rotation event itself
//! - At most one current and one pending value
//! - Access is restricted to the process identity owning the file (0600)

pub mod file;
pub mod memory;
pub mod watcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::secret::Secret;

pub use file::FileSecretStore;
pub use memory::MemorySecretStore;
pub use watcher::StoreWatcher;

/// Errors raised by secret store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No current secret has been stored yet, or the store does not exist.
    #[error("no current secret")]
    NotFound,

    /// An operation needed a pending secret and there is none.
    #[error("no pending secret")]
    NoPending,

    /// A pending secret already exists.
    #[error("a pending secret already exists")]
    PendingExists,

    /// Backend could not be reached or read.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

/// Contract of the secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// The value currently presented by the edge.
    async fn get_current(&self) -> Result<Secret, StoreError>;

    /// The value being rotated in, if a rotation is open. `NotFound` when the
    /// store itself has never been provisioned.
    async fn get_pending(&self) -> Result<Option<Secret>, StoreError>;

    /// Stage a new value. Fails with `PendingExists` if one is already staged.
    async fn set_pending(&self, secret: Secret) -> Result<(), StoreError>;

    /// Make pending the new current; the old current is discarded.
    async fn promote_pending(&self) -> Result<(), StoreError>;

    /// Drop the pending value, leaving current untouched.
    async fn discard_pending(&self) -> Result<(), StoreError>;
}
