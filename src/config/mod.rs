//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file (GUARD_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → GUARD_* environment overrides
//!     → validation.rs (semantic checks for the process role)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults except the header name
//! - A missing header name fails process start, never a request

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AttestationConfig, EdgeConfig, EdgeKind, GateConfig, GuardConfig, ObservabilityConfig,
    RetryConfig, RotationConfig, SidecarConfig, StoreConfig, TlsConfig,
};
pub use validation::{validate_config, Role, ValidationError};
