//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → sidecar server, refresh loop, store watcher, scheduler
//! ```
//!
//! # Design Decisions
//! - Startup is fail fast: config, attestation and bind errors are fatal
//! - Every long-running task subscribes to the same broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_on_signal;
