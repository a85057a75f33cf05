//! Rotation coordinator daemon.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use origin_guard::attestation::{CallerAttestation, EnvAttestation};
use origin_guard::config::{load_config, load_from_env, ObservabilityConfig, Role};
use origin_guard::edge;
use origin_guard::gate::SidecarClient;
use origin_guard::lifecycle::{shutdown_on_signal, Shutdown};
use origin_guard::observability::{logging, metrics};
use origin_guard::rotation::{HttpSidecarNotifier, RotationCoordinator, RotationScheduler};
use origin_guard::store::FileSecretStore;

#[derive(Parser)]
#[command(name = "guard-rotator")]
#[command(about = "Rotates the edge-to-origin shared secret", long_about = None)]
struct Cli {
    /// Config file (overrides GUARD_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single rotation and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => load_config(path, Role::Rotator),
        None => load_from_env(Role::Rotator),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Invalid configuration, refusing to start");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability);

    let store = Arc::new(FileSecretStore::new(&config.store.path));
    let edge = edge::from_config(&config.edge)?;

    let mut coordinator = RotationCoordinator::new(
        store,
        edge,
        config.gate.header_name.clone(),
        config.rotation.clone(),
        config.retries.clone(),
    );

    let attestation = EnvAttestation::new(&config.attestation.token_env);
    if attestation.token().is_ok() {
        let client = SidecarClient::new(
            config.sidecar.base_url(),
            Arc::new(attestation),
            config.gate.ipc_timeout(),
        );
        let notifier = HttpSidecarNotifier::new(client, config.sidecar.base_url());
        coordinator = coordinator.with_notifier(Arc::new(notifier));
    } else {
        tracing::warn!(
            token_env = %config.attestation.token_env,
            "No trust token, sidecars will pick up changes through refresh and miss handling only"
        );
    }
    let coordinator = Arc::new(coordinator);

    if cli.once {
        let report = coordinator.rotate().await?;
        tracing::info!(
            bootstrap = report.bootstrap,
            grace_secs = report.window.grace_duration.as_secs(),
            "Rotation finished"
        );
        return Ok(());
    }

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

    RotationScheduler::new(coordinator, &config.rotation)
        .run(shutdown.subscribe())
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
