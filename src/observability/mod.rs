//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gate, sidecar, rotation produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, loopback by default)
//! ```
//!
//! # Design Decisions
//! - Structured fields, never secret values
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
