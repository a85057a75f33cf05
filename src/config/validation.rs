//! Configuration validation.
//!
//! Semantic checks on top of what serde already enforces. All errors are
//! collected so a broken deployment reports everything at once.

use std::fmt;
use std::net::IpAddr;

use axum::http::HeaderName;

use crate::config::schema::{EdgeKind, GuardConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Which process is validating; each role needs a different subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gate,
    Sidecar,
    Rotator,
}

/// Validate the configuration for the given role.
pub fn validate_config(config: &GuardConfig, role: Role) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Both the gate and the rotator need the header name; the sidecar never sees it.
    if matches!(role, Role::Gate | Role::Rotator) {
        let name = config.gate.header_name.trim();
        if name.is_empty() {
            errors.push(ValidationError::new("gate.header_name", "is required"));
        } else if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "gate.header_name",
                format!("'{}' is not a valid HTTP header name", name),
            ));
        }
    }

    if config.gate.ipc_timeout_ms == 0 {
        errors.push(ValidationError::new("gate.ipc_timeout_ms", "must be greater than 0"));
    }

    match config.sidecar.host.parse::<IpAddr>() {
        Ok(ip) if ip.is_loopback() => {}
        Ok(_) => errors.push(ValidationError::new(
            "sidecar.host",
            "must be a loopback address",
        )),
        Err(_) => errors.push(ValidationError::new(
            "sidecar.host",
            format!("'{}' is not an IP address", config.sidecar.host),
        )),
    }

    if config.sidecar.port == 0 {
        errors.push(ValidationError::new("sidecar.port", "must be non-zero"));
    }

    if config.sidecar.refresh_interval_secs == 0 {
        errors.push(ValidationError::new(
            "sidecar.refresh_interval_secs",
            "must be greater than 0",
        ));
    }

    // Staleness of the accepted set must stay inside the grace window.
    if config.sidecar.refresh_interval_secs >= config.rotation.grace_secs {
        errors.push(ValidationError::new(
            "sidecar.refresh_interval_secs",
            "must be lower than rotation.grace_secs",
        ));
    }

    if config.attestation.token_env.trim().is_empty() {
        errors.push(ValidationError::new("attestation.token_env", "is required"));
    }

    if role == Role::Rotator {
        if config.rotation.interval_secs == 0 {
            errors.push(ValidationError::new(
                "rotation.interval_secs",
                "must be greater than 0",
            ));
        }

        if config.rotation.grace_secs <= config.edge.propagation_delay_secs {
            errors.push(ValidationError::new(
                "rotation.grace_secs",
                "must exceed edge.propagation_delay_secs",
            ));
        }

        // A rotation still inside its grace window must never look abandoned.
        let retry_budget_secs = u64::from(config.retries.max_attempts)
            .saturating_mul(config.retries.max_delay_ms)
            .div_ceil(1000);
        let longest_window = config
            .rotation
            .grace_secs
            .saturating_add(config.edge.propagation_delay_secs)
            .saturating_add(retry_budget_secs);
        if config.rotation.stale_pending_secs <= longest_window {
            errors.push(ValidationError::new(
                "rotation.stale_pending_secs",
                "must exceed rotation.grace_secs plus edge.propagation_delay_secs and the retry budget",
            ));
        }

        if config.rotation.secret_length < 32 {
            errors.push(ValidationError::new(
                "rotation.secret_length",
                "must be at least 32",
            ));
        }

        if config.rotation.interval_secs <= config.rotation.grace_secs {
            errors.push(ValidationError::new(
                "rotation.interval_secs",
                "must exceed rotation.grace_secs",
            ));
        }

        if config.retries.max_attempts == 0 {
            errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
        }

        match config.edge.kind {
            EdgeKind::Webhook => {
                if url::Url::parse(&config.edge.url).is_err() {
                    errors.push(ValidationError::new("edge.url", "must be a valid URL"));
                }
            }
            EdgeKind::File => {
                if config.edge.distribution_path.trim().is_empty() {
                    errors.push(ValidationError::new("edge.distribution_path", "is required"));
                }
            }
        }
    }

    if matches!(role, Role::Sidecar | Role::Rotator) && config.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "is required"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
