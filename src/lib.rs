//! Origin Guard Library
//!
//! Keeps an origin reachable only through its edge layer: the edge injects a
//! shared secret header, the origin gate checks it against a loopback
//! authorization sidecar, and a coordinator rotates the secret without
//! rejecting legitimate traffic.

// Request path
pub mod gate;
pub mod origin;
pub mod protocol;
pub mod sidecar;

// Secret lifecycle
pub mod edge;
pub mod rotation;
pub mod secret;
pub mod store;

// Cross-cutting concerns
pub mod attestation;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
pub use gate::Gate;
pub use lifecycle::Shutdown;
pub use rotation::RotationCoordinator;
pub use sidecar::Sidecar;
