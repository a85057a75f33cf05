//! Origin request gate.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → authorize(): read configured header (case-insensitive)
//!         missing / empty / malformed → 400, sidecar not called
//!     → client.rs: POST /check to the loopback sidecar (bounded timeout)
//!         accepted        → business handler, request untouched
//!         invalid_secret  → 401
//!         anything else   → 500 (fail closed)
//!     → middleware.rs: map verdict to the fixed JSON response
//! ```
//!
//! # Design Decisions
//! - The header name is fixed at startup; a bad name fails the process
//! - Response bodies come from a fixed taxonomy and never echo a value

pub mod client;
pub mod middleware;

use axum::http::{HeaderMap, HeaderName};
use std::sync::Arc;
use std::time::Instant;

use crate::attestation::CallerAttestation;
use crate::config::{ConfigError, GuardConfig, ValidationError};
use crate::observability::metrics;
use crate::protocol::{DenyReason, RejectReason, Verdict};

pub use client::{IpcError, SidecarClient};
pub use middleware::{gate_middleware, protect, rejection_response};

/// The single enforcement point in front of the business handler.
pub struct Gate {
    header: HeaderName,
    client: SidecarClient,
}

enum HeaderValueState<'a> {
    Present(&'a str),
    Missing,
    Malformed,
}

impl Gate {
    pub fn new(header_name: &str, client: SidecarClient) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(header_name.trim().as_bytes()).map_err(|_| {
            ConfigError::Validation(vec![ValidationError {
                field: "gate.header_name",
                message: format!("'{}' is not a valid HTTP header name", header_name),
            }])
        })?;
        Ok(Self { header, client })
    }

    /// Build the gate from validated configuration.
    pub fn from_config(
        config: &GuardConfig,
        attestation: Arc<dyn CallerAttestation>,
    ) -> Result<Self, ConfigError> {
        let client = SidecarClient::new(
            config.sidecar.base_url(),
            attestation,
            config.gate.ipc_timeout(),
        );
        Self::new(&config.gate.header_name, client)
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    fn read_header<'a>(&self, headers: &'a HeaderMap) -> HeaderValueState<'a> {
        let mut values = headers.get_all(&self.header).iter();
        let first = match values.next() {
            Some(v) => v,
            None => return HeaderValueState::Missing,
        };
        if values.next().is_some() {
            return HeaderValueState::Malformed;
        }
        match first.to_str() {
            Ok(v) if v.trim().is_empty() => HeaderValueState::Missing,
            Ok(v) => HeaderValueState::Present(v.trim()),
            Err(_) => HeaderValueState::Malformed,
        }
    }

    /// Decide whether the request may reach the business handler.
    pub async fn authorize(&self, headers: &HeaderMap) -> Verdict {
        let verdict = self.decide(headers).await;
        let outcome = match verdict {
            Verdict::Accepted => "accepted",
            Verdict::Rejected(reason) => reason.as_str(),
        };
        metrics::record_gate_verdict(outcome);
        verdict
    }

    async fn decide(&self, headers: &HeaderMap) -> Verdict {
        let candidate = match self.read_header(headers) {
            HeaderValueState::Present(v) => v,
            HeaderValueState::Missing => {
                tracing::debug!(header = %self.header, "Authorization header missing");
                return Verdict::Rejected(RejectReason::MissingHeader);
            }
            HeaderValueState::Malformed => {
                tracing::debug!(header = %self.header, "Authorization header malformed");
                return Verdict::Rejected(RejectReason::MissingHeader);
            }
        };

        let start = Instant::now();
        let result = self.client.check(candidate).await;
        metrics::record_ipc_latency(start);

        match result {
            Ok(reply) if reply.accepted => Verdict::Accepted,
            Ok(reply) => match reply.reason {
                Some(DenyReason::InvalidSecret) => Verdict::Rejected(RejectReason::InvalidSecret),
                Some(DenyReason::Malformed) => Verdict::Rejected(RejectReason::MissingHeader),
                Some(reason) => {
                    tracing::error!(reason = reason.as_str(), "Sidecar could not verify request");
                    Verdict::Rejected(RejectReason::IpcFailure)
                }
                None => Verdict::Rejected(RejectReason::IpcFailure),
            },
            Err(e) => {
                tracing::error!(error = %e, "Sidecar call failed, rejecting request");
                Verdict::Rejected(RejectReason::IpcFailure)
            }
        }
    }
}
