//! Platform domain types.
//!
//! A platform is one external trust counterparty: an OAuth2/OIDC-style
//! relying party identified by its `(platform_url, client_id)` pair. The
//! persisted identity record is the source of truth; in-memory handles are
//! projections of it and never diverge (see [`crate::platform`]).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::auth_config::AuthConfig;

/// Registration input for a new platform.
///
/// All identity fields are supplied by the caller; the kid and keypair are
/// generated by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRequest {
    /// Display name.
    pub name: String,
    /// Platform URL; with `client_id`, the immutable natural key.
    pub platform_url: String,
    /// Client id issued by the platform.
    pub client_id: String,
    /// Endpoint used for the OIDC login redirect.
    pub authentication_endpoint: String,
    /// Endpoint used to obtain access tokens.
    pub access_token_endpoint: String,
    /// Authorization server identifier used as the `aud` claim when
    /// requesting tokens. Defaults to `access_token_endpoint` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    /// How inbound platform-signed messages are verified.
    pub auth_config: AuthConfig,
}

/// The persisted platform identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRecord {
    /// Key id: globally unique, immutable, the platform's external
    /// identifier and the id of its keypair.
    pub kid: String,
    /// Platform URL (immutable).
    pub platform_url: String,
    /// Client id (immutable).
    pub client_id: String,
    /// Display name (mutable).
    pub platform_name: String,
    /// OIDC login endpoint.
    pub authentication_endpoint: String,
    /// Access token endpoint.
    pub access_token_endpoint: String,
    /// Authorization server identifier, if explicitly configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,
    /// Message-verification configuration.
    pub auth_config: AuthConfig,
}

impl PlatformRecord {
    /// The filter addressing this record by its natural key.
    #[must_use]
    pub fn id_filter(&self) -> Value {
        json!({
            "platformUrl": self.platform_url,
            "clientId": self.client_id,
        })
    }

    /// The effective authorization server: the configured value, or the
    /// access token endpoint when none was set. Never empty.
    #[must_use]
    pub fn authorization_server(&self) -> &str {
        self.authorization_server
            .as_deref()
            .unwrap_or(&self.access_token_endpoint)
    }
}

/// The public projection of a platform.
///
/// This is the only representation exposed outward and the contract any
/// consuming layer depends on. It never includes the private key. The
/// `accesstokenEndpoint` spelling is part of the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformJson {
    /// The platform's kid.
    pub id: String,
    /// Platform URL.
    pub url: String,
    /// Client id.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// OIDC login endpoint.
    pub authentication_endpoint: String,
    /// Access token endpoint.
    #[serde(rename = "accesstokenEndpoint")]
    pub access_token_endpoint: String,
    /// Effective authorization server (never empty).
    pub authorization_server: String,
    /// Message-verification configuration.
    pub auth_config: AuthConfig,
    /// The platform's RSA public key (PEM).
    pub public_key: String,
    /// Whether the platform is active.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_config::AuthMethod;

    fn record() -> PlatformRecord {
        PlatformRecord {
            kid: "kid-1".to_string(),
            platform_url: "https://lms.example.com".to_string(),
            client_id: "client-1".to_string(),
            platform_name: "Example LMS".to_string(),
            authentication_endpoint: "https://lms.example.com/auth".to_string(),
            access_token_endpoint: "https://lms.example.com/token".to_string(),
            authorization_server: None,
            auth_config: AuthConfig::new(AuthMethod::JwkSet, "https://lms.example.com/keys"),
        }
    }

    #[test]
    fn test_authorization_server_fallback() {
        let mut rec = record();
        assert_eq!(rec.authorization_server(), "https://lms.example.com/token");

        rec.authorization_server = Some("https://lms.example.com/as".to_string());
        assert_eq!(rec.authorization_server(), "https://lms.example.com/as");
    }

    #[test]
    fn test_record_serde_field_names() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["platformUrl"], "https://lms.example.com");
        assert_eq!(value["clientId"], "client-1");
        assert_eq!(value["authConfig"]["method"], "JWK_SET");
        // unset authorization server is omitted, not null
        assert!(value.get("authorizationServer").is_none());
    }

    #[test]
    fn test_projection_wire_spelling() {
        let projection = PlatformJson {
            id: "kid-1".to_string(),
            url: "https://lms.example.com".to_string(),
            client_id: "client-1".to_string(),
            name: "Example LMS".to_string(),
            authentication_endpoint: "https://lms.example.com/auth".to_string(),
            access_token_endpoint: "https://lms.example.com/token".to_string(),
            authorization_server: "https://lms.example.com/token".to_string(),
            auth_config: AuthConfig::new(AuthMethod::RsaKey, "pem"),
            public_key: "pem".to_string(),
            active: true,
        };
        let value = serde_json::to_value(projection).unwrap();
        assert!(value.get("accesstokenEndpoint").is_some());
        assert!(value.get("accessTokenEndpoint").is_none());
        assert!(value.get("privateKey").is_none());
    }
}
