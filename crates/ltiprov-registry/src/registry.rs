//! The platform registry.
//!
//! Composes credential custody, status, and the token cache into one
//! addressable `Platform` entity and owns the registration lifecycle.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use ltiprov_storage::{EncryptionKey, Storage};

use crate::RegistryResult;
use crate::error::RegistryError;
use crate::keys::CredentialStore;
use crate::platform::{PLATFORM_COLLECTION, Platform};
use crate::status::StatusLedger;
use crate::token::{TokenAcquirer, TokenCache};
use crate::types::{PlatformRecord, PlatformRequest};

/// Registry of platform records.
///
/// Handles returned by the registry share one token cache, so concurrent
/// token requests across handles still collapse into single-flight groups.
pub struct PlatformRegistry {
    storage: Arc<dyn Storage>,
    credentials: CredentialStore,
    status: StatusLedger,
    tokens: Arc<TokenCache>,
}

impl PlatformRegistry {
    /// Creates a registry over the given storage, process-wide encryption
    /// key, and token acquirer.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        encryption_key: EncryptionKey,
        acquirer: Arc<dyn TokenAcquirer>,
    ) -> Self {
        let credentials = CredentialStore::new(storage.clone(), encryption_key.clone());
        let status = StatusLedger::new(storage.clone());
        let tokens = Arc::new(TokenCache::new(
            storage.clone(),
            encryption_key,
            credentials.clone(),
            acquirer,
        ));
        Self {
            storage,
            credentials,
            status,
            tokens,
        }
    }

    /// Registers a new platform.
    ///
    /// Generates the platform's kid and RSA keypair, stores the keypair
    /// encrypted, and persists the identity record. The new platform is
    /// active by default; no status record is written until the first
    /// explicit `set_active`.
    ///
    /// The conflict check and the insert are separate storage calls, so two
    /// concurrent registrations of one identity can both pass the check; the
    /// final insert is an upsert on the natural key, so at most one identity
    /// record survives either way.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::IdentityConflict`] when a platform with
    /// the same `(platform_url, client_id)` pair already exists.
    pub async fn register(&self, request: PlatformRequest) -> RegistryResult<Platform> {
        let filter = json!({
            "platformUrl": request.platform_url,
            "clientId": request.client_id,
        });
        let existing = self
            .storage
            .get(None, PLATFORM_COLLECTION, &filter)
            .await?;
        if !existing.is_empty() {
            return Err(RegistryError::identity_conflict(
                request.platform_url,
                request.client_id,
            ));
        }

        let kid = Uuid::new_v4().to_string();
        // RSA generation is CPU-heavy; keep it off the async workers.
        let keypair = tokio::task::spawn_blocking(CredentialStore::generate_keypair)
            .await
            .map_err(|e| RegistryError::internal(format!("keypair generation task failed: {e}")))??;
        self.credentials
            .store_keypair(&kid, &keypair.public_pem, &keypair.private_pem)
            .await?;

        let record = PlatformRecord {
            kid: kid.clone(),
            platform_url: request.platform_url,
            client_id: request.client_id,
            platform_name: request.name,
            authentication_endpoint: request.authentication_endpoint,
            access_token_endpoint: request.access_token_endpoint,
            authorization_server: request.authorization_server,
            auth_config: request.auth_config,
        };
        self.storage
            .replace(
                None,
                PLATFORM_COLLECTION,
                &record.id_filter(),
                &to_record_value(&record)?,
            )
            .await?;

        debug!(%kid, platform_url = %record.platform_url, "registered platform");
        Ok(self.handle(record))
    }

    /// Looks up a platform by its natural key.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails or the record is corrupt.
    pub async fn get(
        &self,
        platform_url: &str,
        client_id: &str,
    ) -> RegistryResult<Option<Platform>> {
        let filter = json!({ "platformUrl": platform_url, "clientId": client_id });
        self.first_match(&filter).await
    }

    /// Looks up a platform by its kid.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails or the record is corrupt.
    pub async fn get_by_kid(&self, kid: &str) -> RegistryResult<Option<Platform>> {
        self.first_match(&json!({ "kid": kid })).await
    }

    /// Returns a handle for every registered platform.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails or a record is corrupt.
    pub async fn list(&self) -> RegistryResult<Vec<Platform>> {
        let records = self
            .storage
            .get(None, PLATFORM_COLLECTION, &json!({}))
            .await?;
        records
            .into_iter()
            .map(|value| Ok(self.handle(from_record_value(value)?)))
            .collect()
    }

    /// Deletes the platform with the given kid.
    ///
    /// Returns `false` when no such platform exists.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::PartialDelete`] when some of the
    /// platform's resources could not be removed.
    pub async fn delete_by_kid(&self, kid: &str) -> RegistryResult<bool> {
        match self.get_by_kid(kid).await? {
            Some(platform) => {
                platform.delete().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn first_match(&self, filter: &Value) -> RegistryResult<Option<Platform>> {
        let records = self.storage.get(None, PLATFORM_COLLECTION, filter).await?;
        match records.into_iter().next() {
            Some(value) => Ok(Some(self.handle(from_record_value(value)?))),
            None => Ok(None),
        }
    }

    fn handle(&self, record: PlatformRecord) -> Platform {
        Platform::new(
            record,
            self.storage.clone(),
            self.credentials.clone(),
            self.status.clone(),
            self.tokens.clone(),
        )
    }
}

fn to_record_value(record: &PlatformRecord) -> RegistryResult<Value> {
    serde_json::to_value(record)
        .map_err(|e| RegistryError::internal(format!("platform record not serializable: {e}")))
}

fn from_record_value(value: Value) -> RegistryResult<PlatformRecord> {
    serde_json::from_value(value)
        .map_err(|e| RegistryError::internal(format!("corrupt platform record: {e}")))
}
