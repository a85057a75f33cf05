//! Local authorization sidecar.
//!
//! # Data Flow
//! ```text
//! gate ──POST /check {candidate} + x-guard-token──▶ server.rs
//!     → verify trust token (reject before any comparison)
//!     → cache.rs (constant-time match against snapshot)
//!     → {"accepted": bool, "reason": ...}
//!
//! store ──get_current/get_pending──▶ cache.rs refresh
//!     triggered by: interval, POST /refresh, store watcher, miss after cooldown
//! ```
//!
//! # Design Decisions
//! - Loopback only: bind check plus per-request peer check
//! - Replies never contain accepted values

pub mod cache;
pub mod server;

pub use cache::{AcceptedSetCache, CacheVerdict};
pub use server::{bind_loopback, HealthReply, Sidecar, SidecarState};
