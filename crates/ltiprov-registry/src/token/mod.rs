//! Access token acquisition and caching.
//!
//! Tokens are obtained from a platform's access token endpoint through a
//! client-credentials grant and cached per `(platform_url, client_id,
//! scopes)` key until they expire. The cache never serves a stale token
//! and collapses concurrent refreshes for one key into a single upstream
//! call.
//!
//! - [`TokenCache`] - the cache with single-flight refresh
//! - [`TokenAcquirer`] - the seam to the upstream grant
//! - [`HttpTokenAcquirer`] - RFC 7523 grant over HTTP

mod cache;
mod http;

pub use cache::{TokenCache, TokenKey};
pub use http::{HttpAcquirerConfig, HttpTokenAcquirer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::RegistryResult;

/// An access token as issued by a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The token value.
    pub access_token: String,
    /// Token type as issued (`bearer`, `Bearer`, ...).
    pub token_type: String,
    /// Lifetime in seconds from issuance.
    pub expires_in: i64,
    /// The scope string granted, when the platform reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl AccessToken {
    /// Returns the token with `token_type` capitalized (`bearer` becomes `Bearer`).
    ///
    /// Platforms disagree on the casing; consumers build `Authorization`
    /// headers from this field, so it is normalized on every return path.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let mut chars = self.token_type.chars();
        if let Some(first) = chars.next() {
            self.token_type = first.to_uppercase().collect::<String>() + chars.as_str();
        }
        self
    }
}

/// Everything an acquirer needs to perform one grant.
///
/// The private key PEM passes through here transiently for signing the
/// grant assertion; it is fetched per acquisition and never cached.
#[derive(Clone)]
pub struct TokenRequest {
    /// The client id to authenticate as (`iss`/`sub` of the assertion).
    pub client_id: String,
    /// The endpoint to POST the grant to.
    pub access_token_endpoint: String,
    /// The audience (`aud`) of the assertion: the platform's effective
    /// authorization server.
    pub audience: String,
    /// Key id placed in the assertion header.
    pub kid: String,
    /// PKCS#8 private key PEM used to sign the assertion.
    pub private_key_pem: String,
    /// Space-delimited scope string to request.
    pub scopes: String,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("client_id", &self.client_id)
            .field("access_token_endpoint", &self.access_token_endpoint)
            .field("audience", &self.audience)
            .field("kid", &self.kid)
            .field("private_key_pem", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// The upstream token grant.
///
/// Implementations perform exactly one attempt per call; retry policy
/// belongs to the caller.
#[async_trait]
pub trait TokenAcquirer: Send + Sync {
    /// Acquires a fresh access token for the request.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::RegistryError::TokenAcquisition`] when the grant
    /// is rejected or the endpoint is unreachable.
    async fn acquire(&self, request: &TokenRequest) -> RegistryResult<AccessToken>;
}
