//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use origin_guard::attestation::StaticAttestation;
use origin_guard::config::{GateConfig, SidecarConfig};
use origin_guard::gate::{Gate, SidecarClient};
use origin_guard::lifecycle::Shutdown;
use origin_guard::origin::OriginServer;
use origin_guard::sidecar::{AcceptedSetCache, Sidecar};
use origin_guard::store::SecretStore;
use serde_json::json;
use tokio::net::TcpListener;

pub const HEADER: &str = "X-Sec-Api-Key";
pub const TOKEN: &str = "session-token";

/// A sidecar running on an ephemeral loopback port.
#[allow(dead_code)]
pub struct TestSidecar {
    pub addr: SocketAddr,
    pub cache: Arc<AcceptedSetCache>,
}

impl TestSidecar {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start a sidecar over `store`, loaded before it starts serving.
pub async fn start_sidecar(store: Arc<dyn SecretStore>, shutdown: &Shutdown) -> TestSidecar {
    let cache = Arc::new(AcceptedSetCache::with_timing(
        store,
        Duration::from_secs(60),
        Duration::from_secs(3600),
    ));
    let _ = cache.refresh().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sidecar = Sidecar::new(
        cache.clone(),
        Arc::new(StaticAttestation::new(TOKEN)),
        &SidecarConfig::default(),
    );
    tokio::spawn(sidecar.run(listener, shutdown.clone()));

    TestSidecar { addr, cache }
}

/// A gate-protected origin whose handler counts its invocations.
pub struct TestOrigin {
    pub addr: SocketAddr,
    pub handler_calls: Arc<AtomicUsize>,
}

impl TestOrigin {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    #[allow(dead_code)]
    pub fn handler_calls(&self) -> usize {
        self.handler_calls.load(Ordering::SeqCst)
    }
}

/// Start an origin whose gate calls `sidecar_url` with `token`.
pub async fn start_origin(
    sidecar_url: &str,
    token: &str,
    ipc_timeout: Duration,
    shutdown: &Shutdown,
) -> TestOrigin {
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let calls = handler_calls.clone();
    let business = Router::new().route(
        "/",
        get(move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "message": "Hello, World!" }))
            }
        }),
    );

    let client = SidecarClient::new(sidecar_url, Arc::new(StaticAttestation::new(token)), ipc_timeout);
    let gate = Arc::new(Gate::new(HEADER, client).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = OriginServer::new(business, gate, GateConfig::default());
    tokio::spawn(server.run(listener, shutdown.clone()));

    TestOrigin { addr, handler_calls }
}

/// A listener that accepts connections and never answers. Counts connections.
#[allow(dead_code)]
pub async fn start_silent_sidecar() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });

    (addr, connections)
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// GET `url`, optionally with the secret header. Returns status and body.
pub async fn get_with_header(url: &str, value: Option<&str>) -> (u16, String) {
    let client = reqwest::Client::new();
    let mut request = client.get(url);
    if let Some(value) = value {
        request = request.header(HEADER, value);
    }
    let response = request.send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}
