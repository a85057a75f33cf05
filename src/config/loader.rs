//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, Role, ValidationError};

/// Environment variable pointing at an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "GUARD_CONFIG";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, message: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, message } => write!(f, "Invalid {}: {}", var, message),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML file without validating it.
pub fn read_config_file(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path, role: Role) -> Result<GuardConfig, ConfigError> {
    let config = read_config_file(path)?;
    validate_config(&config, role).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load configuration the way the binaries do: optional file named by
/// `GUARD_CONFIG`, then environment overrides, then validation.
pub fn load_from_env(role: Role) -> Result<GuardConfig, ConfigError> {
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => read_config_file(Path::new(path.trim()))?,
        _ => GuardConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config, role).map_err(ConfigError::Validation)?;

    tracing::debug!(role = ?role, "Configuration loaded");
    Ok(config)
}

/// Apply `GUARD_*` overrides on top of a parsed config.
///
/// `lookup` is injected so tests do not have to touch the process environment.
pub fn apply_env_overrides<F>(config: &mut GuardConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GUARD_HEADER_NAME") {
        config.gate.header_name = v.trim().to_string();
    }
    if let Some(v) = get("GUARD_SIDECAR_PORT") {
        config.sidecar.port = parse_env("GUARD_SIDECAR_PORT", &v)?;
    }
    if let Some(v) = get("GUARD_IPC_TIMEOUT_MS") {
        config.gate.ipc_timeout_ms = parse_env("GUARD_IPC_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("GUARD_ROTATION_INTERVAL_SECS") {
        config.rotation.interval_secs = parse_env("GUARD_ROTATION_INTERVAL_SECS", &v)?;
    }
    if let Some(v) = get("GUARD_GRACE_SECS") {
        config.rotation.grace_secs = parse_env("GUARD_GRACE_SECS", &v)?;
    }
    if let Some(v) = get("GUARD_ROTATE_ON_START") {
        config.rotation.rotate_on_start = parse_env("GUARD_ROTATE_ON_START", &v)?;
    }
    if let Some(v) = get("GUARD_STORE_PATH") {
        config.store.path = v;
    }
    if let Some(v) = get("GUARD_EDGE_URL") {
        config.edge.url = v;
        config.edge.kind = crate::config::schema::EdgeKind::Webhook;
    }
    if let Some(v) = get("GUARD_DISTRIBUTION_PATH") {
        config.edge.distribution_path = v;
    }
    if let Some(v) = get("GUARD_TRUST_TOKEN_ENV") {
        config.attestation.token_env = v;
    }
    if let Some(v) = get("GUARD_LOG_LEVEL") {
        config.observability.log_level = v;
    }

    Ok(())
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: e.to_string(),
    })
}
