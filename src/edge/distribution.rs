//! File-backed distribution config.
//!
//! Models the forwarding config of a CDN distribution: a list of origins, each
//! with the custom headers the edge adds to requests it proxies. An update sets
//! the header value on every origin that already declares the header (header
//! names compare case-insensitively) and bumps the etag. Writes check the etag
//! read at load time, like an `If-Match` update.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::edge::{EdgeError, EdgeInjector};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginEntry {
    pub id: String,
    pub domain: String,
    #[serde(default)]
    pub custom_headers: Vec<CustomHeader>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub origins: Vec<OriginEntry>,
}

impl DistributionConfig {
    /// Set `name` to `value` on every origin declaring it. Returns how many
    /// origins were updated.
    pub fn apply_custom_header(&mut self, name: &str, value: &str) -> usize {
        let mut updated = 0;
        for origin in &mut self.origins {
            if let Some(header) = origin
                .custom_headers
                .iter_mut()
                .find(|h| h.name.eq_ignore_ascii_case(name))
            {
                header.value = value.to_string();
                updated += 1;
            }
        }
        updated
    }

    /// Value currently sent to `origin_id` for header `name`.
    pub fn header_value(&self, origin_id: &str, name: &str) -> Option<&str> {
        self.origins
            .iter()
            .find(|o| o.id == origin_id)?
            .custom_headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn next_etag(&self) -> String {
        let n: u64 = self.etag.trim_start_matches('E').parse().unwrap_or(0);
        format!("E{}", n + 1)
    }
}

/// Edge injector writing a local distribution config file.
pub struct FileEdgeInjector {
    path: PathBuf,
}

impl FileEdgeInjector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<DistributionConfig, EdgeError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| EdgeError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| EdgeError::Io(e.to_string()))
    }

    /// Write `config` if the file still carries `expected_etag`.
    pub async fn store(&self, config: &DistributionConfig, expected_etag: &str) -> Result<(), EdgeError> {
        let on_disk = self.load().await?;
        if on_disk.etag != expected_etag {
            return Err(EdgeError::Conflict {
                expected: expected_etag.to_string(),
                found: on_disk.etag,
            });
        }

        let bytes = serde_json::to_vec_pretty(config).map_err(|e| EdgeError::Io(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| EdgeError::Io(e.to_string()))?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EdgeError::Io(e.to_string()))
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), EdgeError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| EdgeError::Io(e.to_string()))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), EdgeError> {
    Ok(())
}

#[async_trait]
impl EdgeInjector for FileEdgeInjector {
    async fn update_header(&self, name: &str, value: &str) -> Result<(), EdgeError> {
        let mut config = self.load().await?;
        let loaded_etag = config.etag.clone();

        let updated = config.apply_custom_header(name, value);
        if updated == 0 {
            return Err(EdgeError::HeaderNotDeclared(name.to_string()));
        }
        config.etag = config.next_etag();

        self.store(&config, &loaded_etag).await?;
        tracing::info!(
            header = name,
            origins = updated,
            etag = %config.etag,
            "Distribution config updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DistributionConfig {
        DistributionConfig {
            etag: "E1".into(),
            origins: vec![
                OriginEntry {
                    id: "fn-url".into(),
                    domain: "abc.lambda-url.example.com".into(),
                    custom_headers: vec![CustomHeader {
                        name: "X-Sec-Api-Key".into(),
                        value: "abc123".into(),
                    }],
                },
                OriginEntry {
                    id: "static".into(),
                    domain: "assets.example.com".into(),
                    custom_headers: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_apply_is_case_insensitive_and_scoped() {
        let mut config = sample();
        assert_eq!(config.apply_custom_header("x-sec-api-key", "xyz789"), 1);
        assert_eq!(config.header_value("fn-url", "X-SEC-API-KEY"), Some("xyz789"));
        assert_eq!(config.header_value("static", "x-sec-api-key"), None);
    }

    #[tokio::test]
    async fn test_update_writes_file_and_bumps_etag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distribution.json");
        tokio::fs::write(&path, serde_json::to_vec(&sample()).unwrap())
            .await
            .unwrap();

        let injector = FileEdgeInjector::new(&path);
        injector.update_header("X-Sec-Api-Key", "xyz789").await.unwrap();

        let config = injector.load().await.unwrap();
        assert_eq!(config.etag, "E2");
        assert_eq!(config.header_value("fn-url", "X-Sec-Api-Key"), Some("xyz789"));
    }

    #[tokio::test]
    async fn test_undeclared_header_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distribution.json");
        tokio::fs::write(&path, serde_json::to_vec(&sample()).unwrap())
            .await
            .unwrap();

        let injector = FileEdgeInjector::new(&path);
        let err = injector.update_header("X-Other", "v").await.unwrap_err();
        assert!(matches!(err, EdgeError::HeaderNotDeclared(_)));
    }

    #[tokio::test]
    async fn test_stale_etag_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distribution.json");
        tokio::fs::write(&path, serde_json::to_vec(&sample()).unwrap())
            .await
            .unwrap();

        let injector = FileEdgeInjector::new(&path);
        let err = injector.store(&sample(), "E0").await.unwrap_err();
        assert!(matches!(err, EdgeError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let injector = FileEdgeInjector::new(dir.path().join("missing.json"));
        assert!(matches!(
            injector.update_header("X-Sec-Api-Key", "v").await,
            Err(EdgeError::Io(_))
        ));
    }
}
