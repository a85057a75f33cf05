//! Local caller attestation.
//!
//! The gate proves to the sidecar that it is the co-located origin process by
//! presenting a trust token. Where the token comes from is pluggable: the
//! default reads an ambient platform credential from an environment variable
//! on every call, so a credential the platform refreshes is picked up without
//! a restart.

use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("trust token variable {0} is not set")]
    Missing(String),
}

/// A process-local credential. Redacted in `Debug`, zeroized on drop.
#[derive(Clone)]
pub struct TrustToken(String);

impl TrustToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TrustToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrustToken(<redacted>)")
    }
}

impl Drop for TrustToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Gate side: produce the token to present.
pub trait CallerAttestation: Send + Sync {
    fn token(&self) -> Result<TrustToken, AttestationError>;
}

/// Sidecar side: decide whether a presented token is valid right now.
pub trait CallerVerifier: Send + Sync {
    fn verify(&self, presented: Option<&str>) -> bool;
}

fn tokens_match(expected: &str, presented: Option<&str>) -> bool {
    match presented {
        Some(p) if !p.is_empty() && !expected.is_empty() => {
            expected.as_bytes().ct_eq(p.as_bytes()).into()
        }
        _ => false,
    }
}

/// Ambient credential read from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvAttestation {
    var: String,
}

impl EnvAttestation {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    /// Fail fast at startup when the variable is absent.
    pub fn ensure_present(&self) -> Result<(), AttestationError> {
        self.token().map(|_| ())
    }
}

impl CallerAttestation for EnvAttestation {
    fn token(&self) -> Result<TrustToken, AttestationError> {
        match std::env::var(&self.var) {
            Ok(v) if !v.is_empty() => Ok(TrustToken::new(v)),
            _ => Err(AttestationError::Missing(self.var.clone())),
        }
    }
}

impl CallerVerifier for EnvAttestation {
    fn verify(&self, presented: Option<&str>) -> bool {
        match self.token() {
            Ok(expected) => tokens_match(expected.expose(), presented),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot verify caller, rejecting");
                false
            }
        }
    }
}

/// Fixed token, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticAttestation {
    token: TrustToken,
}

impl StaticAttestation {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: TrustToken::new(token),
        }
    }
}

impl CallerAttestation for StaticAttestation {
    fn token(&self) -> Result<TrustToken, AttestationError> {
        Ok(self.token.clone())
    }
}

impl CallerVerifier for StaticAttestation {
    fn verify(&self, presented: Option<&str>) -> bool {
        tokens_match(self.token.expose(), presented)
    }
}
