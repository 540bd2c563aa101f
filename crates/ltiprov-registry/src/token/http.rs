//! Client-credentials token grant over HTTP.
//!
//! Implements the RFC 7523 JWT-bearer client-credentials grant the LTI
//! security model prescribes: a short-lived assertion signed with the
//! tool's private key, POSTed as a form to the platform's access token
//! endpoint with the requested scope string.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::RegistryResult;
use crate::error::RegistryError;
use crate::token::{AccessToken, TokenAcquirer, TokenRequest};

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Configuration for [`HttpTokenAcquirer`].
#[derive(Debug, Clone)]
pub struct HttpAcquirerConfig {
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Lifetime of the signed grant assertion (default: 60 seconds).
    pub assertion_lifetime: Duration,
}

impl Default for HttpAcquirerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            assertion_lifetime: Duration::from_secs(60),
        }
    }
}

impl HttpAcquirerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the assertion lifetime.
    #[must_use]
    pub fn with_assertion_lifetime(mut self, lifetime: Duration) -> Self {
        self.assertion_lifetime = lifetime;
        self
    }
}

/// Claims of the grant assertion per RFC 7523: `iss` and `sub` are the
/// client id, `aud` is the platform's authorization server.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    jti: String,
}

/// [`TokenAcquirer`] backed by an HTTP client.
pub struct HttpTokenAcquirer {
    http: reqwest::Client,
    config: HttpAcquirerConfig,
}

impl HttpTokenAcquirer {
    /// Creates an acquirer with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: HttpAcquirerConfig) -> RegistryResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RegistryError::internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Creates an acquirer with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_defaults() -> RegistryResult<Self> {
        Self::new(HttpAcquirerConfig::default())
    }

    /// Builds and signs the grant assertion for `request`.
    fn sign_assertion(&self, request: &TokenRequest) -> RegistryResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &request.client_id,
            sub: &request.client_id,
            aud: &request.audience,
            iat: now,
            exp: now + self.config.assertion_lifetime.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(request.kid.clone());
        let key = EncodingKey::from_rsa_pem(request.private_key_pem.as_bytes())
            .map_err(|e| RegistryError::token_acquisition(format!("invalid signing key: {e}")))?;

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| RegistryError::token_acquisition(format!("assertion signing failed: {e}")))
    }
}

#[async_trait]
impl TokenAcquirer for HttpTokenAcquirer {
    async fn acquire(&self, request: &TokenRequest) -> RegistryResult<AccessToken> {
        let assertion = self.sign_assertion(request)?;

        debug!(
            endpoint = %request.access_token_endpoint,
            scopes = %request.scopes,
            "requesting access token"
        );

        let response = self
            .http
            .post(&request.access_token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
                ("scope", request.scopes.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                RegistryError::token_acquisition(format!("token endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %request.access_token_endpoint, %status, "token grant rejected");
            return Err(RegistryError::token_acquisition(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response.json::<AccessToken>().await.map_err(|e| {
            RegistryError::token_acquisition(format!("invalid token response: {e}"))
        })
    }
}
