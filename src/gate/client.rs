//! Loopback client for the authorization sidecar.
//!
//! # Responsibilities
//! - POST the candidate as a JSON body with the trust token header
//! - Enforce a hard deadline on the whole call (connect + reply)
//! - Decode the sidecar's verdict; anything unexpected is an error

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::attestation::{AttestationError, CallerAttestation};
use crate::protocol::{CheckRequest, CheckResponse, CHECK_PATH, HEALTH_PATH, REFRESH_PATH, TRUST_TOKEN_HEADER};

/// Largest sidecar reply we are willing to read.
const MAX_REPLY_BYTES: usize = 4 * 1024;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("attestation unavailable: {0}")]
    Attestation(#[from] AttestationError),

    #[error("trust token is not a valid header value")]
    InvalidToken,

    #[error("invalid sidecar url: {0}")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("sidecar did not answer within {0:?}")]
    Timeout(Duration),

    #[error("unexpected sidecar reply (status {0})")]
    UnexpectedReply(u16),
}

/// HTTP client bound to one sidecar.
#[derive(Clone)]
pub struct SidecarClient {
    client: Client<HttpConnector, Body>,
    base_url: String,
    attestation: Arc<dyn CallerAttestation>,
    timeout: Duration,
}

impl SidecarClient {
    pub fn new(
        base_url: impl Into<String>,
        attestation: Arc<dyn CallerAttestation>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attestation,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn uri(&self, path: &str) -> Result<Uri, IpcError> {
        format!("{}{}", self.base_url, path)
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| IpcError::InvalidUrl(e.to_string()))
    }

    fn token_header(&self) -> Result<HeaderValue, IpcError> {
        let token = self.attestation.token()?;
        HeaderValue::from_str(token.expose()).map_err(|_| IpcError::InvalidToken)
    }

    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, axum::body::Bytes), IpcError> {
        let call = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| IpcError::Transport(e.to_string()))?;
            let status = response.status();
            let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_REPLY_BYTES)
                .await
                .map_err(|e| IpcError::Transport(e.to_string()))?;
            Ok((status, body))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(IpcError::Timeout(self.timeout)),
        }
    }

    /// Ask the sidecar whether `candidate` is accepted.
    pub async fn check(&self, candidate: &str) -> Result<CheckResponse, IpcError> {
        let body = serde_json::to_vec(&CheckRequest {
            candidate: candidate.to_string(),
        })
        .map_err(|e| IpcError::Transport(e.to_string()))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(CHECK_PATH)?)
            .header(header::CONTENT_TYPE, "application/json")
            .header(TRUST_TOKEN_HEADER, self.token_header()?)
            .body(Body::from(body))
            .map_err(|e| IpcError::Transport(e.to_string()))?;

        let (status, bytes) = self.send(request).await?;
        let reply: CheckResponse =
            serde_json::from_slice(&bytes).map_err(|_| IpcError::UnexpectedReply(status.as_u16()))?;

        // Accepted only when status and body agree.
        match (status, reply.accepted, reply.reason) {
            (StatusCode::OK, true, None) => Ok(reply),
            (s, false, Some(reason)) if s == reason.status() => Ok(reply),
            _ => Err(IpcError::UnexpectedReply(status.as_u16())),
        }
    }

    /// Send the invalidation signal.
    pub async fn refresh(&self) -> Result<(), IpcError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri(REFRESH_PATH)?)
            .header(TRUST_TOKEN_HEADER, self.token_header()?)
            .body(Body::empty())
            .map_err(|e| IpcError::Transport(e.to_string()))?;

        let (status, _) = self.send(request).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(IpcError::UnexpectedReply(status.as_u16()))
        }
    }

    /// Raw health reply.
    pub async fn health(&self) -> Result<(StatusCode, serde_json::Value), IpcError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.uri(HEALTH_PATH)?)
            .body(Body::empty())
            .map_err(|e| IpcError::Transport(e.to_string()))?;

        let (status, bytes) = self.send(request).await?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|_| IpcError::UnexpectedReply(status.as_u16()))?;
        Ok((status, value))
    }
}
