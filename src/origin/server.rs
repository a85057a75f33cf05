//! Origin HTTP server.
//!
//! # Responsibilities
//! - Wrap any business router with the gate
//! - Wire up tracing, request ids and the request timeout
//! - Serve plain HTTP or TLS with graceful shutdown

use axum::{http::HeaderName, routing::get, Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GateConfig;
use crate::gate::{protect, Gate};
use crate::lifecycle::Shutdown;
use crate::origin::tls::load_tls_config;

const X_REQUEST_ID: &str = "x-request-id";

/// A business router behind the gate.
pub struct OriginServer {
    router: Router,
    config: GateConfig,
}

impl OriginServer {
    pub fn new(business: Router, gate: Arc<Gate>, config: GateConfig) -> Self {
        let router = Self::build_router(business, gate, &config);
        Self { router, config }
    }

    #[allow(deprecated)]
    fn build_router(business: Router, gate: Arc<Gate>, config: &GateConfig) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        protect(business, gate)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Origin server listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signaled())
            .await?;

        tracing::info!("Origin server stopped");
        Ok(())
    }

    /// Bind the configured address and serve, over TLS when configured.
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let Some(tls) = self.config.tls.clone() else {
            let listener = TcpListener::bind(&self.config.bind_address).await?;
            return self.run(listener, shutdown).await;
        };

        let addr: SocketAddr = self
            .config
            .bind_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let rustls = load_tls_config(&tls).await?;

        let handle = axum_server::Handle::new();
        let signal_handle = handle.clone();
        let signaled = shutdown.signaled();
        tokio::spawn(async move {
            signaled.await;
            signal_handle.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        tracing::info!(address = %addr, "Origin server listening (TLS)");
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("Origin server stopped");
        Ok(())
    }
}

/// Minimal business handler used by the demo origin.
pub fn hello_router() -> Router {
    Router::new().route("/", get(|| async { Json(json!({ "message": "Hello, World!" })) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::StaticAttestation;
    use crate::gate::SidecarClient;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_missing_header_never_reaches_handler() {
        let client = SidecarClient::new(
            "http://127.0.0.1:9",
            Arc::new(StaticAttestation::new("t")),
            Duration::from_millis(200),
        );
        let gate = Arc::new(Gate::new("X-Sec-Api-Key", client).unwrap());
        let server = OriginServer::new(hello_router(), gate, GateConfig::default());

        let response = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], br#"{"message":"Bad request"}"#);
    }
}
