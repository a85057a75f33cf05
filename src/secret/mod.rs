//! Secret values and the accepted set.
//!
//! A [`Secret`] never prints its value: `Debug` and `Display` are redacted and
//! the backing string is zeroized on drop. The only way to read the value is
//! [`Secret::expose`], which keeps every use greppable.

pub mod generator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

pub use generator::generate_secret;

/// Stage of a secret inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretStage {
    Current,
    Pending,
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// An opaque shared secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret {
    value: String,
    /// Creation timestamp (seconds since epoch).
    pub created_at: u64,
}

impl Secret {
    /// Wrap a value created now.
    pub fn new(value: impl Into<String>) -> Self {
        Self::with_created_at(value, unix_now())
    }

    pub fn with_created_at(value: impl Into<String>, created_at: u64) -> Self {
        Self {
            value: value.into(),
            created_at,
        }
    }

    /// Borrow the raw value. Never log the result.
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Constant-time comparison against a candidate.
    ///
    /// Lengths are not hidden; the contents are.
    pub fn ct_matches(&self, candidate: &[u8]) -> Choice {
        self.value.as_bytes().ct_eq(candidate)
    }

    /// Age in seconds, saturating at zero for clocks that went backwards.
    pub fn age_secs(&self) -> u64 {
        unix_now().saturating_sub(self.created_at)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.ct_matches(other.value.as_bytes()))
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Immutable snapshot of the values the sidecar accepts.
///
/// Swapped as a whole; readers never observe a half-updated set.
#[derive(Debug, Clone, Default)]
pub struct AcceptedSet {
    pub current: Option<Secret>,
    pub pending: Option<Secret>,
    /// Unix time the snapshot was read from the store.
    pub loaded_at: u64,
}

impl AcceptedSet {
    pub fn new(current: Option<Secret>, pending: Option<Secret>) -> Self {
        Self {
            current,
            pending,
            loaded_at: unix_now(),
        }
    }

    /// Number of values accepted.
    pub fn len(&self) -> usize {
        self.current.iter().count() + self.pending.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a rotation window is open.
    pub fn in_rotation(&self) -> bool {
        self.pending.is_some()
    }

    /// Compare the candidate against every accepted value.
    ///
    /// All entries are compared; there is no early exit on a match. Returns
    /// the verdict and the number of comparisons performed.
    pub fn matches(&self, candidate: &str) -> (bool, usize) {
        let mut hit = Choice::from(0u8);
        let mut compared = 0;
        for secret in self.current.iter().chain(self.pending.iter()) {
            hit |= secret.ct_matches(candidate.as_bytes());
            compared += 1;
        }
        (bool::from(hit), compared)
    }
}
