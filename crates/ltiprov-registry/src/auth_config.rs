//! Platform message-verification configuration.
//!
//! Each platform declares how its inbound signed messages are verified:
//! with a raw RSA public key, a single JWK, or a JWK set URL. Updates are
//! partial: an omitted side of `(method, key)` inherits the previous value.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RegistryResult;
use crate::error::RegistryError;

/// Method used to verify messages signed by a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMethod {
    /// A raw RSA public key supplied by the platform.
    #[serde(rename = "RSA_KEY")]
    RsaKey,
    /// A single JWK supplied by the platform.
    #[serde(rename = "JWK_KEY")]
    JwkKey,
    /// A JWK set URL hosted by the platform.
    #[serde(rename = "JWK_SET")]
    JwkSet,
}

impl AuthMethod {
    /// Returns the wire representation of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaKey => "RSA_KEY",
            Self::JwkKey => "JWK_KEY",
            Self::JwkSet => "JWK_SET",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA_KEY" => Ok(Self::RsaKey),
            "JWK_KEY" => Ok(Self::JwkKey),
            "JWK_SET" => Ok(Self::JwkSet),
            other => Err(RegistryError::invalid_method(other)),
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A platform's verification configuration: the method plus its key material
/// (RSA public key PEM, JWK JSON, or JWK set URL depending on the method).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The verification method.
    pub method: AuthMethod,
    /// Key material or key set address, per `method`.
    pub key: String,
}

impl AuthConfig {
    /// Creates a new configuration.
    #[must_use]
    pub fn new(method: AuthMethod, key: impl Into<String>) -> Self {
        Self {
            method,
            key: key.into(),
        }
    }

    /// Merges a partial update into this configuration.
    ///
    /// An omitted argument inherits the current value for that field, so
    /// `merge(None, None)` returns the configuration unchanged.
    #[must_use]
    pub fn merge(&self, method: Option<AuthMethod>, key: Option<String>) -> Self {
        Self {
            method: method.unwrap_or(self.method),
            key: key.unwrap_or_else(|| self.key.clone()),
        }
    }

    /// Parses an `(optional method string, optional key)` pair as received
    /// from an external caller and merges it into this configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::InvalidMethod`] when the method string is
    /// not one of `RSA_KEY`, `JWK_KEY`, `JWK_SET`; the current configuration
    /// is left untouched.
    pub fn merge_str(&self, method: Option<&str>, key: Option<String>) -> RegistryResult<Self> {
        let method = method.map(AuthMethod::from_str).transpose()?;
        Ok(self.merge(method, key))
    }
}
