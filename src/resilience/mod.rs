//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store write / edge push / initial sidecar load:
//!     → retries.rs (retry with backoff until max_attempts)
//!     → backoff.rs (exponential delay with jitter)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline or a bounded attempt count
//! - Backoff delays carry up to 10% jitter

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::retry_with_backoff;
