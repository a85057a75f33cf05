//! Demo origin: a hello-world handler behind the gate.

use std::sync::Arc;

use origin_guard::attestation::EnvAttestation;
use origin_guard::config::{load_from_env, ObservabilityConfig, Role};
use origin_guard::gate::Gate;
use origin_guard::lifecycle::{shutdown_on_signal, Shutdown};
use origin_guard::observability::{logging, metrics};
use origin_guard::origin::{hello_router, OriginServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match load_from_env(Role::Gate) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability);

    let attestation = EnvAttestation::new(&config.attestation.token_env);
    attestation.ensure_present()?;

    let gate = Arc::new(Gate::from_config(&config, Arc::new(attestation))?);
    tracing::info!(
        header = %gate.header_name(),
        sidecar = %config.sidecar.base_url(),
        ipc_timeout_ms = config.gate.ipc_timeout_ms,
        tls = config.gate.tls.is_some(),
        "Gate configured"
    );

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

    OriginServer::new(hello_router(), gate, config.gate.clone())
        .serve(shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
