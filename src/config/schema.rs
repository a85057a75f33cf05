//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default loopback port of the authorization sidecar.
pub const DEFAULT_SIDECAR_PORT: u16 = 3579;

/// Root configuration shared by the gate, the sidecar and the rotator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Origin request gate settings.
    pub gate: GateConfig,

    /// Local authorization sidecar settings.
    pub sidecar: SidecarConfig,

    /// Trust token source shared by gate and sidecar.
    pub attestation: AttestationConfig,

    /// Rotation schedule and grace window.
    pub rotation: RotationConfig,

    /// Retry policy for rotation legs and store access.
    pub retries: RetryConfig,

    /// Secret store backend.
    pub store: StoreConfig,

    /// Edge injector backend.
    pub edge: EdgeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Origin request gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Name of the header carrying the edge secret. Required.
    pub header_name: String,

    /// Timeout of the loopback call to the sidecar, in milliseconds.
    pub ipc_timeout_ms: u64,

    /// Bind address of the demo origin server.
    pub bind_address: String,

    /// Optional TLS for the origin listener.
    pub tls: Option<TlsConfig>,

    /// Request timeout of the origin server in seconds.
    pub request_timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            header_name: String::new(),
            ipc_timeout_ms: 2000,
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            request_timeout_secs: 30,
        }
    }
}

impl GateConfig {
    pub fn ipc_timeout(&self) -> Duration {
        Duration::from_millis(self.ipc_timeout_ms)
    }
}

/// TLS configuration for the origin listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Local authorization sidecar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Loopback host the sidecar binds to.
    pub host: String,

    /// Loopback port the sidecar binds to.
    pub port: u16,

    /// Periodic refresh of the accepted set, in seconds.
    pub refresh_interval_secs: u64,

    /// Minimum age of the accepted set before a miss triggers a refresh.
    pub miss_refresh_cooldown_secs: u64,

    /// Maximum accepted request body for `/check`, in bytes.
    pub max_body_bytes: usize,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_SIDECAR_PORT,
            refresh_interval_secs: 60,
            miss_refresh_cooldown_secs: 15,
            max_body_bytes: 8 * 1024,
        }
    }
}

impl SidecarConfig {
    /// Socket address string the sidecar listens on.
    pub fn bind_address(&self) -> String {
        match self.host.parse::<std::net::IpAddr>() {
            Ok(ip) => std::net::SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.host, self.port),
        }
    }

    /// Base URL the gate uses to reach the sidecar.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.bind_address())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn miss_refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.miss_refresh_cooldown_secs)
    }
}

/// Where the process-local trust token comes from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AttestationConfig {
    /// Environment variable holding the ambient credential.
    pub token_env: String,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            token_env: "GUARD_TRUST_TOKEN".to_string(),
        }
    }
}

/// Rotation coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Interval between scheduled rotations in seconds.
    pub interval_secs: u64,

    /// How long old and new values are both accepted, in seconds.
    pub grace_secs: u64,

    /// Rotate once immediately when the coordinator starts.
    pub rotate_on_start: bool,

    /// Length of generated secrets.
    pub secret_length: usize,

    /// Age after which a leftover pending value counts as abandoned.
    pub stale_pending_secs: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            grace_secs: 300,
            rotate_on_start: false,
            secret_length: 64,
            stale_pending_secs: 3600,
        }
    }
}

impl RotationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

/// Secret store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON secret file.
    pub path: String,

    /// Watch the file and refresh the sidecar when it changes.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/origin-guard/secret.json".to_string(),
            watch: true,
        }
    }
}

/// Which edge injector implementation to use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Local JSON distribution config.
    File,
    /// HTTP(S) config endpoint of the edge layer.
    Webhook,
}

/// Edge injector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub kind: EdgeKind,

    /// Distribution config path (file kind).
    pub distribution_path: String,

    /// Config endpoint (webhook kind).
    pub url: String,

    /// Environment variable holding the webhook bearer token.
    pub auth_token_env: String,

    /// Webhook request timeout in seconds.
    pub timeout_secs: u64,

    /// Upper bound on how long the edge keeps sending the old value.
    pub propagation_delay_secs: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            kind: EdgeKind::File,
            distribution_path: "/var/lib/origin-guard/distribution.json".to_string(),
            url: String::new(),
            auth_token_env: "GUARD_EDGE_TOKEN".to_string(),
            timeout_secs: 10,
            propagation_delay_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_urls() {
        let mut sidecar = SidecarConfig::default();
        assert_eq!(sidecar.base_url(), "http://127.0.0.1:3579");

        sidecar.host = "::1".to_string();
        assert_eq!(sidecar.bind_address(), "[::1]:3579");
        assert_eq!(sidecar.base_url(), "http://[::1]:3579");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GuardConfig = toml::from_str(
            r#"
            [gate]
            header_name = "X-Sec-Api-Key"

            [edge]
            kind = "webhook"
            url = "https://edge.example.com/headers"
            "#,
        )
        .unwrap();

        assert_eq!(config.gate.ipc_timeout_ms, 2000);
        assert_eq!(config.sidecar.port, DEFAULT_SIDECAR_PORT);
        assert_eq!(config.edge.kind, EdgeKind::Webhook);
        assert_eq!(config.rotation.grace_secs, 300);
    }
}
