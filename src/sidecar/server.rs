//! Loopback HTTP surface of the sidecar.
//!
//! # Endpoints
//! - `POST /check`  : body `{"candidate": "..."}`, header `x-guard-token`
//! - `POST /refresh`: invalidation signal, header `x-guard-token`
//! - `GET  /health` : load/degraded state, no values
//!
//! The trust token is checked before the body is even parsed, so a caller
//! without a valid token never causes a secret comparison.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::attestation::CallerVerifier;
use crate::config::SidecarConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::protocol::{
    CheckRequest, CheckResponse, DenyReason, CHECK_PATH, HEALTH_PATH, REFRESH_PATH,
    TRUST_TOKEN_HEADER,
};
use crate::sidecar::cache::{AcceptedSetCache, CacheVerdict};

/// Shared handler state.
#[derive(Clone)]
pub struct SidecarState {
    pub cache: Arc<AcceptedSetCache>,
    pub verifier: Arc<dyn CallerVerifier>,
}

impl SidecarState {
    /// Validate a candidate presented with a trust token.
    ///
    /// Token first; a failed token check returns before any comparison.
    pub async fn check(&self, candidate: &str, trust_token: Option<&str>) -> CheckResponse {
        if !self.verifier.verify(trust_token) {
            return CheckResponse::denied(DenyReason::UntrustedCaller);
        }

        let candidate = candidate.trim();
        if candidate.is_empty() {
            return CheckResponse::denied(DenyReason::Malformed);
        }

        match self.cache.check(candidate).await {
            CacheVerdict::Accepted => CheckResponse::accepted(),
            CacheVerdict::Rejected => CheckResponse::denied(DenyReason::InvalidSecret),
            CacheVerdict::Unavailable => CheckResponse::denied(DenyReason::Unavailable),
        }
    }
}

/// The local authorization sidecar server.
pub struct Sidecar {
    router: Router,
    cache: Arc<AcceptedSetCache>,
}

impl Sidecar {
    pub fn new(
        cache: Arc<AcceptedSetCache>,
        verifier: Arc<dyn CallerVerifier>,
        config: &SidecarConfig,
    ) -> Self {
        let state = SidecarState {
            cache: cache.clone(),
            verifier,
        };
        let router = Self::build_router(state, config.max_body_bytes);
        Self { router, cache }
    }

    #[allow(deprecated)]
    fn build_router(state: SidecarState, max_body_bytes: usize) -> Router {
        Router::new()
            .route(CHECK_PATH, post(check_handler))
            .route(REFRESH_PATH, post(refresh_handler))
            .route(HEALTH_PATH, get(health_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(5)))
            .layer(middleware::from_fn(loopback_only))
            .layer(TraceLayer::new_for_http())
    }

    pub fn cache(&self) -> Arc<AcceptedSetCache> {
        self.cache.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Authorization sidecar listening");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signaled())
            .await?;

        tracing::info!("Authorization sidecar stopped");
        Ok(())
    }
}

/// Bind the sidecar listener, refusing anything but a loopback address.
pub async fn bind_loopback(config: &SidecarConfig) -> Result<TcpListener, std::io::Error> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    if !addr.ip().is_loopback() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("sidecar must bind a loopback address, got {}", addr.ip()),
        ));
    }

    TcpListener::bind(addr).await
}

/// Reject peers that are not on this host.
async fn loopback_only(request: Request<Body>, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match peer {
        Some(addr) if addr.ip().is_loopback() => next.run(request).await,
        other => {
            tracing::warn!(peer = ?other, "Rejected non-loopback caller");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(TRUST_TOKEN_HEADER).and_then(|v| v.to_str().ok())
}

fn reply(response: CheckResponse) -> Response {
    let status = match response.reason {
        None => StatusCode::OK,
        Some(reason) => reason.status(),
    };
    let outcome = response.reason.map(DenyReason::as_str).unwrap_or("accepted");
    metrics::record_sidecar_check(outcome);
    (status, Json(response)).into_response()
}

async fn check_handler(
    State(state): State<SidecarState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = presented_token(&headers);
    if !state.verifier.verify(token) {
        tracing::warn!("Check rejected: untrusted caller");
        return reply(CheckResponse::denied(DenyReason::UntrustedCaller));
    }

    let request: CheckRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return reply(CheckResponse::denied(DenyReason::Malformed)),
    };

    let response = state.check(&request.candidate, token).await;
    if let Some(reason) = response.reason {
        tracing::debug!(reason = reason.as_str(), "Check denied");
    }
    reply(response)
}

#[derive(Serialize)]
struct RefreshReply {
    refreshed: bool,
}

async fn refresh_handler(State(state): State<SidecarState>, headers: HeaderMap) -> Response {
    if !state.verifier.verify(presented_token(&headers)) {
        tracing::warn!("Refresh rejected: untrusted caller");
        return (
            StatusCode::UNAUTHORIZED,
            Json(CheckResponse::denied(DenyReason::UntrustedCaller)),
        )
            .into_response();
    }

    match state.cache.refresh().await {
        Ok(()) => (StatusCode::OK, Json(RefreshReply { refreshed: true })).into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(RefreshReply { refreshed: false }),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct HealthReply {
    pub loaded: bool,
    pub degraded: bool,
    pub accepted_values: usize,
    pub in_rotation: bool,
}

async fn health_handler(State(state): State<SidecarState>) -> impl IntoResponse {
    let snapshot = state.cache.snapshot();
    let reply = HealthReply {
        loaded: state.cache.is_loaded(),
        degraded: state.cache.is_degraded(),
        accepted_values: snapshot.len(),
        in_rotation: snapshot.in_rotation(),
    };
    let status = if reply.loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(reply))
}
