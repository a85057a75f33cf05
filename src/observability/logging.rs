//! Structured logging.
//!
//! JSON lines for production, pretty format for development. `RUST_LOG` wins
//! over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global tracing subscriber.
pub fn init_logging(config: &ObservabilityConfig) {
    let fallback = format!(
        "origin_guard={level},guard_rotator={level},demo_origin={level},tower_http=info",
        level = config.log_level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into());

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        // Already installed, e.g. by a test harness.
        tracing::debug!(error = %e, "Tracing subscriber already set");
    }
}
