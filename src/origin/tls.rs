//! TLS certificate loading for the origin listener.

use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

use crate::config::TlsConfig;

/// Load a rustls config from PEM certificate and key files.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, std::io::Error> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    for (kind, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} file not found: {:?}", kind, path),
            ));
        }
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}
