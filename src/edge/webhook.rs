//! HTTP edge injector.
//!
//! Pushes the header value to a config endpoint owned by the edge provider:
//! `POST {url}` with `{"header_name": ..., "header_value": ...}` and an
//! optional bearer token read from the environment. Any 2xx is an
//! acknowledgement.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::config::EdgeConfig;
use crate::edge::{EdgeError, EdgeInjector};

#[derive(Serialize)]
struct HeaderUpdate<'a> {
    header_name: &'a str,
    header_value: &'a str,
}

pub struct WebhookEdgeInjector {
    client: reqwest::Client,
    url: String,
    token_env: String,
}

impl WebhookEdgeInjector {
    pub fn new(url: impl Into<String>, token_env: impl Into<String>, timeout: Duration) -> Result<Self, EdgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            token_env: token_env.into(),
        })
    }

    pub fn from_config(config: &EdgeConfig) -> Result<Self, EdgeError> {
        Self::new(
            config.url.clone(),
            config.auth_token_env.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn bearer(&self) -> Option<Zeroizing<String>> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .map(Zeroizing::new)
    }
}

#[async_trait]
impl EdgeInjector for WebhookEdgeInjector {
    async fn update_header(&self, name: &str, value: &str) -> Result<(), EdgeError> {
        let mut request = self.client.post(&self.url).json(&HeaderUpdate {
            header_name: name,
            header_value: value,
        });
        if let Some(token) = self.bearer() {
            request = request.bearer_auth(token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| EdgeError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::Rejected(status.as_u16()));
        }
        tracing::info!(header = name, status = status.as_u16(), "Edge config endpoint acknowledged update");
        Ok(())
    }
}
