//! The `Platform` handle.
//!
//! A handle pairs an in-memory copy of the identity record with the
//! collaborators that own the platform's keys, status, and tokens. Any
//! number of handles to one logical platform may coexist; the persisted
//! record is the source of truth, so every setter persists first and only
//! then updates its in-memory field. A crash between the two steps can
//! leave a handle stale but never leave the store behind a handle.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use ltiprov_storage::Storage;

use crate::RegistryResult;
use crate::auth_config::{AuthConfig, AuthMethod};
use crate::error::RegistryError;
use crate::keys::{CredentialStore, PRIVATE_KEY_COLLECTION, PUBLIC_KEY_COLLECTION};
use crate::status::{STATUS_COLLECTION, StatusLedger};
use crate::token::{AccessToken, TokenCache};
use crate::types::{PlatformJson, PlatformRecord};

pub(crate) const PLATFORM_COLLECTION: &str = "platform";

/// One addressable platform.
#[derive(Clone)]
pub struct Platform {
    record: PlatformRecord,
    storage: Arc<dyn Storage>,
    credentials: CredentialStore,
    status: StatusLedger,
    tokens: Arc<TokenCache>,
}

impl Platform {
    pub(crate) fn new(
        record: PlatformRecord,
        storage: Arc<dyn Storage>,
        credentials: CredentialStore,
        status: StatusLedger,
        tokens: Arc<TokenCache>,
    ) -> Self {
        Self {
            record,
            storage,
            credentials,
            status,
            tokens,
        }
    }

    /// The platform's kid: its external identifier and keypair id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.record.kid
    }

    /// The platform URL (immutable).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.record.platform_url
    }

    /// The client id (immutable).
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.record.client_id
    }

    /// The display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.platform_name
    }

    /// The OIDC login endpoint.
    #[must_use]
    pub fn authentication_endpoint(&self) -> &str {
        &self.record.authentication_endpoint
    }

    /// The access token endpoint.
    #[must_use]
    pub fn access_token_endpoint(&self) -> &str {
        &self.record.access_token_endpoint
    }

    /// The effective authorization server; never empty (falls back to the
    /// access token endpoint).
    #[must_use]
    pub fn authorization_server(&self) -> &str {
        self.record.authorization_server()
    }

    /// The message-verification configuration.
    #[must_use]
    pub fn auth_config(&self) -> &AuthConfig {
        &self.record.auth_config
    }

    /// Renames the platform, persisting before the in-memory update.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; the in-memory name is then
    /// left unchanged.
    pub async fn set_name(&mut self, name: impl Into<String>) -> RegistryResult<String> {
        let name = name.into();
        self.persist_field(json!({ "platformName": name })).await?;
        self.record.platform_name = name.clone();
        Ok(name)
    }

    /// Sets the OIDC login endpoint, persisting before the in-memory update.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn set_authentication_endpoint(
        &mut self,
        endpoint: impl Into<String>,
    ) -> RegistryResult<String> {
        let endpoint = endpoint.into();
        self.persist_field(json!({ "authenticationEndpoint": endpoint }))
            .await?;
        self.record.authentication_endpoint = endpoint.clone();
        Ok(endpoint)
    }

    /// Sets the access token endpoint, persisting before the in-memory
    /// update.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn set_access_token_endpoint(
        &mut self,
        endpoint: impl Into<String>,
    ) -> RegistryResult<String> {
        let endpoint = endpoint.into();
        self.persist_field(json!({ "accessTokenEndpoint": endpoint }))
            .await?;
        self.record.access_token_endpoint = endpoint.clone();
        Ok(endpoint)
    }

    /// Sets the authorization server identifier, persisting before the
    /// in-memory update.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn set_authorization_server(
        &mut self,
        authorization_server: impl Into<String>,
    ) -> RegistryResult<String> {
        let authorization_server = authorization_server.into();
        self.persist_field(json!({ "authorizationServer": authorization_server }))
            .await?;
        self.record.authorization_server = Some(authorization_server.clone());
        Ok(authorization_server)
    }

    /// Applies a partial update to the verification configuration.
    ///
    /// An omitted side inherits the current value; both sides omitted is a
    /// read and performs no I/O. The merged configuration is persisted
    /// before the in-memory update, so no intermediate state is observable.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails; the configuration is then
    /// left unchanged.
    pub async fn set_auth_config(
        &mut self,
        method: Option<AuthMethod>,
        key: Option<String>,
    ) -> RegistryResult<AuthConfig> {
        if method.is_none() && key.is_none() {
            return Ok(self.record.auth_config.clone());
        }
        let merged = self.record.auth_config.merge(method, key);
        self.persist_field(json!({ "authConfig": merged })).await?;
        self.record.auth_config = merged.clone();
        Ok(merged)
    }

    /// Returns whether the platform is active (`true` until a status record
    /// is first written).
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn active(&self) -> RegistryResult<bool> {
        self.status.status(&self.record.kid).await
    }

    /// Activates or deactivates the platform.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn set_active(&self, active: bool) -> RegistryResult<bool> {
        self.status.set_status(&self.record.kid, active).await
    }

    /// Returns the platform's RSA public key PEM.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::KeyNotFound`] when no keypair exists.
    pub async fn public_key(&self) -> RegistryResult<String> {
        self.credentials.public_key(&self.record.kid).await
    }

    /// Returns the platform's decrypted RSA private key PEM.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::KeyNotFound`] when no keypair exists.
    pub async fn private_key(&self) -> RegistryResult<String> {
        self.credentials.private_key(&self.record.kid).await
    }

    /// Returns a valid access token for `scopes`, reusing the cached one
    /// while it is fresh. See [`TokenCache::token`].
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::TokenAcquisition`] when a refresh is
    /// needed and the upstream grant fails.
    pub async fn access_token(&self, scopes: &str) -> RegistryResult<AccessToken> {
        self.tokens.token(&self.record, scopes).await
    }

    /// Returns the public projection of the platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key or status cannot be read.
    pub async fn to_json(&self) -> RegistryResult<PlatformJson> {
        Ok(PlatformJson {
            id: self.record.kid.clone(),
            url: self.record.platform_url.clone(),
            client_id: self.record.client_id.clone(),
            name: self.record.platform_name.clone(),
            authentication_endpoint: self.record.authentication_endpoint.clone(),
            access_token_endpoint: self.record.access_token_endpoint.clone(),
            authorization_server: self.record.authorization_server().to_string(),
            auth_config: self.record.auth_config.clone(),
            public_key: self.public_key().await?,
            active: self.active().await?,
        })
    }

    /// Deletes the platform: the identity record, the status record, and
    /// both halves of the keypair.
    ///
    /// The four deletions hit independent resources with no cross-resource
    /// transaction; every one is attempted regardless of earlier failures.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::PartialDelete`] naming each resource
    /// whose removal failed.
    pub async fn delete(self) -> RegistryResult<()> {
        let kid = &self.record.kid;
        let mut failed = Vec::new();

        if let Err(err) = self
            .storage
            .delete(PLATFORM_COLLECTION, &self.record.id_filter())
            .await
        {
            warn!(%kid, error = %err, "failed to delete platform identity record");
            failed.push(PLATFORM_COLLECTION.to_string());
        }
        if let Err(err) = self.status.delete(kid).await {
            warn!(%kid, error = %err, "failed to delete platform status record");
            failed.push(STATUS_COLLECTION.to_string());
        }
        if let Err(err) = self.credentials.delete_public_key(kid).await {
            warn!(%kid, error = %err, "failed to delete public key");
            failed.push(PUBLIC_KEY_COLLECTION.to_string());
        }
        if let Err(err) = self.credentials.delete_private_key(kid).await {
            warn!(%kid, error = %err, "failed to delete private key");
            failed.push(PRIVATE_KEY_COLLECTION.to_string());
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::partial_delete(failed))
        }
    }

    /// Persists a single-field patch on the identity record.
    async fn persist_field(&self, patch: serde_json::Value) -> RegistryResult<()> {
        self.storage
            .modify(None, PLATFORM_COLLECTION, &self.record.id_filter(), &patch)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("kid", &self.record.kid)
            .field("platform_url", &self.record.platform_url)
            .field("client_id", &self.record.client_id)
            .finish_non_exhaustive()
    }
}
