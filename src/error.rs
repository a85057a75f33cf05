//! Crate-wide error taxonomy.
//!
//! Per-request errors (`MissingHeader`, `InvalidSecret`, `IpcFailure`) end at
//! the gate. Rotation-side errors (`StoreUnavailable`, `PublishFailure`,
//! `ConcurrentRotation`) are logged and retried by the scheduler. No variant
//! carries a secret value.

use thiserror::Error;

use crate::attestation::AttestationError;
use crate::config::ConfigError;
use crate::edge::EdgeError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum GuardError {
    /// Header absent, empty or malformed.
    #[error("missing or malformed authorization header")]
    MissingHeader,

    /// Header present but not in the accepted set.
    #[error("invalid secret")]
    InvalidSecret,

    /// Sidecar unreachable, timed out or answered unexpectedly.
    #[error("sidecar call failed: {0}")]
    IpcFailure(String),

    /// Secret store could not be read or written.
    #[error("secret store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Edge injector did not acknowledge the new header value.
    #[error("edge publish failed: {0}")]
    PublishFailure(#[from] EdgeError),

    /// Another rotation is already in flight.
    #[error("a rotation is already in progress")]
    ConcurrentRotation,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("attestation error: {0}")]
    Attestation(#[from] AttestationError),
}

pub type GuardResult<T> = Result<T, GuardError>;
