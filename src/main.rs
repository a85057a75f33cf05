//! Origin Guard authorization sidecar.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────── origin host ───────────────────────────┐
//!                 │                                                                     │
//!   Edge ─────────┼─▶ gate ──POST /check + x-guard-token──▶ sidecar (127.0.0.1:3579)   │
//!   (injects      │     │                                     │  ArcSwap<AcceptedSet>   │
//!    secret       │     ▼                                     │  refresh: interval,     │
//!    header)      │  business handler                         │  /refresh, file watch,  │
//!                 │                                           │  miss after cooldown    │
//!                 └───────────────────────────────────────────┼─────────────────────────┘
//!                                                             ▼
//!                                                       secret store ◀── guard-rotator
//!                                                                            │
//!                                                                            ▼
//!                                                                      edge config
//! ```
//!
//! This binary runs the sidecar. `demo-origin` runs a gate-protected origin,
//! `guard-rotator` the rotation coordinator and `guard-cli` talks to a sidecar.

use std::sync::Arc;

use origin_guard::attestation::EnvAttestation;
use origin_guard::config::{load_from_env, ObservabilityConfig, Role};
use origin_guard::lifecycle::{shutdown_on_signal, Shutdown};
use origin_guard::observability::{logging, metrics};
use origin_guard::resilience::retry_with_backoff;
use origin_guard::sidecar::{bind_loopback, AcceptedSetCache, Sidecar};
use origin_guard::store::{FileSecretStore, StoreWatcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match load_from_env(Role::Sidecar) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability);

    tracing::info!(
        address = %config.sidecar.bind_address(),
        store = %config.store.path,
        refresh_interval_secs = config.sidecar.refresh_interval_secs,
        "origin-guard sidecar v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let attestation = EnvAttestation::new(&config.attestation.token_env);
    attestation.ensure_present()?;

    let store = Arc::new(FileSecretStore::new(&config.store.path));
    let cache = Arc::new(AcceptedSetCache::new(store, &config.sidecar));

    // Start anyway on failure: checks answer `unavailable` until a refresh lands.
    if let Err(e) = retry_with_backoff(&config.retries, "sidecar.initial_load", || cache.refresh()).await {
        tracing::warn!(error = %e, "Accepted set not loaded, gate will fail closed until the store is readable");
    }

    let _watcher = if config.store.watch {
        let on_change = cache.clone();
        match StoreWatcher::new(std::path::Path::new(&config.store.path)).run(move || on_change.invalidate()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Store watcher unavailable, relying on periodic refresh");
                None
            }
        }
    } else {
        None
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    tokio::spawn(cache.clone().run(shutdown.subscribe()));

    let listener = bind_loopback(&config.sidecar).await?;
    let sidecar = Sidecar::new(cache, Arc::new(attestation), &config.sidecar);
    sidecar.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
