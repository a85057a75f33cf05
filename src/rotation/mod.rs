//! Rotation coordinator.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (on start / every interval)
//!     → coordinator.rs rotate()
//!         Generating  → new secret (OsRng)
//!         Publishing  → store.set_pending → read back
//!                     → notifier.rs: sidecars refresh (origin accepts new)
//!                     → edge.update_header (edge starts sending new)
//!         Grace       → old and new both accepted
//!         Finalizing  → store.promote_pending → sidecars refresh
//! ```
//!
//! # Design Decisions
//! - The origin learns a value before the edge sends it
//! - A failed edge push reverts the store so nothing half-published lingers
//! - One rotation at a time; overlapping attempts are refused, not queued

pub mod coordinator;
pub mod notifier;
pub mod scheduler;

use serde::Serialize;
use std::time::Duration;

use crate::secret::Secret;

pub use coordinator::RotationCoordinator;
pub use notifier::{HttpSidecarNotifier, SidecarNotifier};
pub use scheduler::RotationScheduler;

/// Phase of the rotation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RotationPhase {
    Idle = 0,
    Generating = 1,
    Publishing = 2,
    Grace = 3,
    Finalizing = 4,
}

impl RotationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPhase::Idle => "idle",
            RotationPhase::Generating => "generating",
            RotationPhase::Publishing => "publishing",
            RotationPhase::Grace => "grace",
            RotationPhase::Finalizing => "finalizing",
        }
    }
}

/// The period during which both the old and the new value are accepted.
#[derive(Debug, Clone)]
pub struct RotationWindow {
    /// Unix seconds at which the pending value was published.
    pub started_at: u64,
    pub grace_duration: Duration,
    pub pending_secret: Secret,
}

/// Result of a completed rotation.
#[derive(Debug, Clone)]
pub struct RotationReport {
    pub window: RotationWindow,
    /// No current value existed; the first secret was installed without grace.
    pub bootstrap: bool,
    /// A leftover pending value from an abandoned rotation was discarded first.
    pub discarded_stale_pending: bool,
}
