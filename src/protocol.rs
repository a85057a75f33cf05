//! Wire types shared by the gate and the sidecar.
//!
//! The candidate travels in a JSON request body, never in the URL, so it does
//! not end up in access logs or intermediate caches.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the caller's trust token on loopback calls.
pub const TRUST_TOKEN_HEADER: &str = "x-guard-token";

pub const CHECK_PATH: &str = "/check";
pub const REFRESH_PATH: &str = "/refresh";
pub const HEALTH_PATH: &str = "/health";

/// Body of `POST /check`.
#[derive(Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub candidate: String,
}

impl fmt::Debug for CheckRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRequest")
            .field("candidate", &"<redacted>")
            .finish()
    }
}

/// Why the sidecar denied a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Candidate matched no accepted value.
    InvalidSecret,
    /// Trust token missing or wrong.
    UntrustedCaller,
    /// Request body missing, unparseable or empty candidate.
    Malformed,
    /// Accepted set never loaded.
    Unavailable,
}

impl DenyReason {
    pub fn status(self) -> StatusCode {
        match self {
            DenyReason::InvalidSecret | DenyReason::UntrustedCaller => StatusCode::UNAUTHORIZED,
            DenyReason::Malformed => StatusCode::BAD_REQUEST,
            DenyReason::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::InvalidSecret => "invalid_secret",
            DenyReason::UntrustedCaller => "untrusted_caller",
            DenyReason::Malformed => "malformed",
            DenyReason::Unavailable => "unavailable",
        }
    }
}

/// Body of every `/check` reply. Never contains accepted values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl CheckResponse {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn denied(reason: DenyReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
        }
    }
}

/// Reason a request was rejected at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingHeader,
    InvalidSecret,
    IpcFailure,
}

impl RejectReason {
    /// Status from the fixed response taxonomy.
    pub fn status(self) -> StatusCode {
        match self {
            RejectReason::MissingHeader => StatusCode::BAD_REQUEST,
            RejectReason::InvalidSecret => StatusCode::UNAUTHORIZED,
            RejectReason::IpcFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic message returned to the caller.
    pub fn message(self) -> &'static str {
        match self {
            RejectReason::MissingHeader => "Bad request",
            RejectReason::InvalidSecret => "Unauthorized",
            RejectReason::IpcFailure => "Internal error",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MissingHeader => "missing_header",
            RejectReason::InvalidSecret => "invalid_secret",
            RejectReason::IpcFailure => "ipc_failure",
        }
    }
}

/// Outcome of authorizing one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_shape() {
        let ok = serde_json::to_string(&CheckResponse::accepted()).unwrap();
        assert_eq!(ok, r#"{"accepted":true}"#);

        let denied = serde_json::to_string(&CheckResponse::denied(DenyReason::InvalidSecret)).unwrap();
        assert_eq!(denied, r#"{"accepted":false,"reason":"invalid_secret"}"#);
    }

    #[test]
    fn test_taxonomy() {
        assert_eq!(RejectReason::MissingHeader.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RejectReason::InvalidSecret.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RejectReason::IpcFailure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(RejectReason::MissingHeader.message(), "Bad request");
        assert_eq!(RejectReason::InvalidSecret.message(), "Unauthorized");
        assert_eq!(RejectReason::IpcFailure.message(), "Internal error");
    }

    #[test]
    fn test_request_debug_is_redacted() {
        let req = CheckRequest {
            candidate: "abc123".into(),
        };
        assert!(!format!("{:?}", req).contains("abc123"));
    }
}
