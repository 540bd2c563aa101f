//! The access token cache.
//!
//! Entries are persisted in an encrypted collection so that every handle
//! to a platform, in this process or another, converges on the same cached
//! token. Within a process, concurrent refreshes of one key are collapsed
//! into a single upstream acquisition (single-flight); duplicate grants
//! against a remote authority are a functional defect, not merely wasted
//! work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use ltiprov_storage::{EncryptionKey, Storage};

use crate::RegistryResult;
use crate::error::RegistryError;
use crate::keys::CredentialStore;
use crate::token::{AccessToken, TokenAcquirer, TokenRequest};
use crate::types::PlatformRecord;

pub(crate) const ACCESS_TOKEN_COLLECTION: &str = "access_token";

/// Cache key for one token: platform natural key plus the scope string.
///
/// Scopes compare by exact string equality. Two differently ordered scope
/// strings are distinct keys and will hold distinct tokens; callers that
/// want reuse must request a stable scope string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    /// Platform URL.
    pub platform_url: String,
    /// Client id.
    pub client_id: String,
    /// Space-delimited scope string, compared verbatim.
    pub scopes: String,
}

impl TokenKey {
    fn filter(&self) -> Value {
        json!({
            "platformUrl": self.platform_url,
            "clientId": self.client_id,
            "scopes": self.scopes,
        })
    }
}

/// The persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenEntry {
    platform_url: String,
    client_id: String,
    scopes: String,
    token: AccessToken,
    /// Unix milliseconds at acquisition.
    created_at: i64,
}

impl TokenEntry {
    /// Valid iff `(now - created_at)/1000 < expires_in`.
    fn is_fresh(&self, now_ms: i64) -> bool {
        (now_ms - self.created_at) / 1000 < self.token.expires_in
    }
}

type FlightResult = RegistryResult<AccessToken>;

/// Pending waiters for an in-flight acquisition of one key.
#[derive(Default)]
struct FlightGroup {
    waiters: Vec<oneshot::Sender<FlightResult>>,
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Per-(platform, scopes) access token cache with single-flight refresh.
pub struct TokenCache {
    storage: Arc<dyn Storage>,
    encryption_key: EncryptionKey,
    credentials: CredentialStore,
    acquirer: Arc<dyn TokenAcquirer>,
    /// In-flight acquisitions by key. Guarded by a std mutex held only for
    /// map mutation, never across an await.
    in_flight: Mutex<HashMap<TokenKey, FlightGroup>>,
}

/// Removes the flight entry if the leader never completed, releasing any
/// waiters with a cancellation error (their senders are dropped).
struct FlightGuard<'a> {
    cache: &'a TokenCache,
    key: &'a TokenKey,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.flights().remove(self.key);
        }
    }
}

impl TokenCache {
    /// Creates a token cache.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        encryption_key: EncryptionKey,
        credentials: CredentialStore,
        acquirer: Arc<dyn TokenAcquirer>,
    ) -> Self {
        Self {
            storage,
            encryption_key,
            credentials,
            acquirer,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a valid access token for `(platform, scopes)`.
    ///
    /// Serves the cached token while it is fresh; otherwise acquires a new
    /// one, signing the grant assertion with the platform's private key and
    /// using its effective authorization server as the audience. The
    /// returned `token_type` is always capitalized.
    ///
    /// Concurrent calls for an identical key that all observe a stale or
    /// missing entry collapse into one upstream acquisition; every caller
    /// receives that call's result. If the leading caller is cancelled, the
    /// cache is not mutated and the remaining callers fail with a
    /// cancellation-flavored `TokenAcquisition` error.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::TokenAcquisition`] when the upstream
    /// grant fails; any existing cache entry is left untouched.
    pub async fn token(
        &self,
        platform: &PlatformRecord,
        scopes: &str,
    ) -> RegistryResult<AccessToken> {
        let key = TokenKey {
            platform_url: platform.platform_url.clone(),
            client_id: platform.client_id.clone(),
            scopes: scopes.to_string(),
        };

        // Fresh entries need no coordination.
        if let Some(entry) = self.lookup(&key).await? {
            if entry.is_fresh(now_ms()) {
                debug!(platform_url = %key.platform_url, scopes = %key.scopes, "access token found in cache");
                return Ok(entry.token.normalized());
            }
        }

        match self.join_flight(&key) {
            FlightRole::Waiter(rx) => rx.await.unwrap_or_else(|_| {
                Err(RegistryError::token_acquisition(
                    "acquisition cancelled before a token was obtained",
                ))
            }),
            FlightRole::Leader => {
                let mut guard = FlightGuard {
                    cache: self,
                    key: &key,
                    armed: true,
                };
                let result = self.refresh(&key, platform).await;
                self.finish_flight(&key, &result);
                guard.armed = false;
                result
            }
        }
    }

    fn flights(&self) -> MutexGuard<'_, HashMap<TokenKey, FlightGroup>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins the in-flight group for `key`, or starts one.
    fn join_flight(&self, key: &TokenKey) -> FlightRole {
        let mut flights = self.flights();
        match flights.get_mut(key) {
            Some(group) => {
                let (tx, rx) = oneshot::channel();
                group.waiters.push(tx);
                FlightRole::Waiter(rx)
            }
            None => {
                flights.insert(key.clone(), FlightGroup::default());
                FlightRole::Leader
            }
        }
    }

    /// Delivers the leader's result to every waiter and clears the group.
    fn finish_flight(&self, key: &TokenKey, result: &FlightResult) {
        let group = self.flights().remove(key);
        if let Some(group) = group {
            for tx in group.waiters {
                let _ = tx.send(result.clone());
            }
        }
    }

    /// Performs one refresh as flight leader.
    async fn refresh(&self, key: &TokenKey, platform: &PlatformRecord) -> FlightResult {
        // Another handle may have refreshed while this one queued.
        if let Some(entry) = self.lookup(key).await? {
            if entry.is_fresh(now_ms()) {
                return Ok(entry.token.normalized());
            }
        }

        debug!(
            platform_url = %key.platform_url,
            scopes = %key.scopes,
            "no valid access token cached, requesting a new one"
        );

        let private_key_pem = self.credentials.private_key(&platform.kid).await?;
        let request = TokenRequest {
            client_id: platform.client_id.clone(),
            access_token_endpoint: platform.access_token_endpoint.clone(),
            audience: platform.authorization_server().to_string(),
            kid: platform.kid.clone(),
            private_key_pem,
            scopes: key.scopes.clone(),
        };

        let token = match self.acquirer.acquire(&request).await {
            Ok(token) => token,
            Err(err) => {
                warn!(platform_url = %key.platform_url, error = %err, "token acquisition failed");
                return Err(err);
            }
        };

        let entry = TokenEntry {
            platform_url: key.platform_url.clone(),
            client_id: key.client_id.clone(),
            scopes: key.scopes.clone(),
            token: token.clone(),
            created_at: now_ms(),
        };
        let record = serde_json::to_value(&entry)
            .map_err(|e| RegistryError::internal(format!("token entry not serializable: {e}")))?;
        self.storage
            .replace(
                Some(&self.encryption_key),
                ACCESS_TOKEN_COLLECTION,
                &key.filter(),
                &record,
            )
            .await?;

        Ok(token.normalized())
    }

    async fn lookup(&self, key: &TokenKey) -> RegistryResult<Option<TokenEntry>> {
        let records = self
            .storage
            .get(
                Some(&self.encryption_key),
                ACCESS_TOKEN_COLLECTION,
                &key.filter(),
            )
            .await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        let entry = serde_json::from_value(record)
            .map_err(|e| RegistryError::internal(format!("corrupt token cache entry: {e}")))?;
        Ok(Some(entry))
    }
}

enum FlightRole {
    Leader,
    Waiter(oneshot::Receiver<FlightResult>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use ltiprov_storage::MemoryStorage;

    use crate::auth_config::{AuthConfig, AuthMethod};

    /// Counts acquisitions and optionally stalls until released.
    struct CountingAcquirer {
        calls: AtomicUsize,
        gate: Option<Arc<tokio::sync::Notify>>,
        fail: bool,
    }

    impl CountingAcquirer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                fail: true,
            }
        }

        fn gated(gate: Arc<tokio::sync::Notify>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: Some(gate),
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenAcquirer for CountingAcquirer {
        async fn acquire(&self, request: &TokenRequest) -> RegistryResult<AccessToken> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(RegistryError::token_acquisition("endpoint rejected grant"));
            }
            Ok(AccessToken {
                access_token: format!("token-{call}-{}", request.scopes),
                token_type: "bearer".to_string(),
                expires_in: 3600,
                scope: Some(request.scopes.clone()),
            })
        }
    }

    fn platform() -> PlatformRecord {
        PlatformRecord {
            kid: "kid-1".to_string(),
            platform_url: "https://lms.example.com".to_string(),
            client_id: "client-1".to_string(),
            platform_name: "LMS".to_string(),
            authentication_endpoint: "https://lms.example.com/auth".to_string(),
            access_token_endpoint: "https://lms.example.com/token".to_string(),
            authorization_server: None,
            auth_config: AuthConfig::new(AuthMethod::JwkSet, "https://lms.example.com/keys"),
        }
    }

    async fn cache_with(acquirer: Arc<CountingAcquirer>) -> (Arc<TokenCache>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let encryption_key = EncryptionKey::derive("test");
        let credentials =
            CredentialStore::new(storage.clone(), encryption_key.clone());
        credentials
            .store_keypair("kid-1", "PUB-PEM", "PRIV-PEM")
            .await
            .unwrap();
        let cache = Arc::new(TokenCache::new(
            storage.clone(),
            encryption_key,
            credentials,
            acquirer,
        ));
        (cache, storage)
    }

    /// Writes a cache entry whose `created_at` lies `age_secs` in the past.
    async fn seed_entry(storage: &MemoryStorage, token: &str, expires_in: i64, age_secs: i64) {
        let key = EncryptionKey::derive("test");
        let filter = json!({
            "platformUrl": "https://lms.example.com",
            "clientId": "client-1",
            "scopes": "s1 s2",
        });
        let record = json!({
            "platformUrl": "https://lms.example.com",
            "clientId": "client-1",
            "scopes": "s1 s2",
            "token": {
                "access_token": token,
                "token_type": "bearer",
                "expires_in": expires_in,
            },
            "createdAt": now_ms() - age_secs * 1000,
        });
        storage
            .replace(Some(&key), ACCESS_TOKEN_COLLECTION, &filter, &record)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fresh_entry_served_without_upstream_call() {
        let acquirer = Arc::new(CountingAcquirer::new());
        let (cache, storage) = cache_with(acquirer.clone()).await;
        seed_entry(&storage, "cached", 60, 30).await;

        let token = cache.token(&platform(), "s1 s2").await.unwrap();
        assert_eq!(token.access_token, "cached");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(acquirer.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_triggers_exactly_one_refresh() {
        let acquirer = Arc::new(CountingAcquirer::new());
        let (cache, storage) = cache_with(acquirer.clone()).await;
        seed_entry(&storage, "stale", 60, 90).await;

        let token = cache.token(&platform(), "s1 s2").await.unwrap();
        assert_ne!(token.access_token, "stale");
        assert_eq!(acquirer.calls(), 1);

        // the replacement entry is fresh now
        let again = cache.token(&platform(), "s1 s2").await.unwrap();
        assert_eq!(again.access_token, token.access_token);
        assert_eq!(acquirer.calls(), 1);
    }

    #[tokio::test]
    async fn test_token_type_normalized_on_fresh_acquisition() {
        let acquirer = Arc::new(CountingAcquirer::new());
        let (cache, _storage) = cache_with(acquirer).await;

        let token = cache.token(&platform(), "s1").await.unwrap();
        assert_eq!(token.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_scope_strings_are_distinct_cache_keys() {
        let acquirer = Arc::new(CountingAcquirer::new());
        let (cache, _storage) = cache_with(acquirer.clone()).await;

        cache.token(&platform(), "a b").await.unwrap();
        cache.token(&platform(), "b a").await.unwrap();
        // different ordering, different key, two upstream calls
        assert_eq!(acquirer.calls(), 2);

        cache.token(&platform(), "a b").await.unwrap();
        assert_eq!(acquirer.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_acquisition_leaves_existing_entry_untouched() {
        let acquirer = Arc::new(CountingAcquirer::failing());
        let (cache, storage) = cache_with(acquirer.clone()).await;
        seed_entry(&storage, "stale", 60, 90).await;

        let err = cache.token(&platform(), "s1 s2").await.unwrap_err();
        assert!(err.is_token_acquisition());

        // stale entry still present, not corrupted and not refreshed
        let key = EncryptionKey::derive("test");
        let records = storage
            .get(
                Some(&key),
                ACCESS_TOKEN_COLLECTION,
                &json!({"platformUrl": "https://lms.example.com", "clientId": "client-1", "scopes": "s1 s2"}),
            )
            .await
            .unwrap();
        assert_eq!(records[0]["token"]["access_token"], json!("stale"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_collapse_to_one_acquisition() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let acquirer = Arc::new(CountingAcquirer::gated(gate.clone()));
        let (cache, _storage) = cache_with(acquirer.clone()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.token(&platform(), "s1 s2").await
            }));
        }

        // let every task reach the cache before releasing the leader
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        gate.notify_waiters();
        gate.notify_one();

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(acquirer.calls(), 1);
        for token in &tokens {
            assert_eq!(token.access_token, tokens[0].access_token);
        }
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters_with_error() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let acquirer = Arc::new(CountingAcquirer::gated(gate.clone()));
        let (cache, storage) = cache_with(acquirer.clone()).await;

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.token(&platform(), "s1 s2").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.token(&platform(), "s1 s2").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // cancel the leader mid-acquisition
        leader.abort();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_token_acquisition());

        // no cache mutation happened
        let key = EncryptionKey::derive("test");
        let records = storage
            .get(
                Some(&key),
                ACCESS_TOKEN_COLLECTION,
                &json!({"platformUrl": "https://lms.example.com", "clientId": "client-1", "scopes": "s1 s2"}),
            )
            .await
            .unwrap();
        assert!(records.is_empty());
    }

}
