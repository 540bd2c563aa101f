//! Platform active/inactive status.
//!
//! Status lives in its own plaintext collection keyed by kid. A platform
//! with no status record is active: records are only written on the first
//! explicit `set_status`, so registration does not touch this collection.

use std::sync::Arc;

use serde_json::json;

use ltiprov_storage::Storage;

use crate::RegistryResult;

pub(crate) const STATUS_COLLECTION: &str = "platform_status";

/// Active/inactive flag per platform, active by default.
#[derive(Clone)]
pub struct StatusLedger {
    storage: Arc<dyn Storage>,
}

impl StatusLedger {
    /// Creates a status ledger over the given storage.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns the platform's status; `true` when no record exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn status(&self, kid: &str) -> RegistryResult<bool> {
        let records = self
            .storage
            .get(None, STATUS_COLLECTION, &json!({ "id": kid }))
            .await?;
        Ok(match records.first() {
            Some(record) => record["active"].as_bool().unwrap_or(true),
            None => true,
        })
    }

    /// Sets the platform's status, fully replacing any existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn set_status(&self, kid: &str, active: bool) -> RegistryResult<bool> {
        self.storage
            .replace(
                None,
                STATUS_COLLECTION,
                &json!({ "id": kid }),
                &json!({ "id": kid, "active": active }),
            )
            .await?;
        Ok(active)
    }

    /// Removes the platform's status record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub async fn delete(&self, kid: &str) -> RegistryResult<()> {
        self.storage
            .delete(STATUS_COLLECTION, &json!({ "id": kid }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltiprov_storage::MemoryStorage;

    fn ledger() -> StatusLedger {
        StatusLedger::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_active_by_default() {
        let ledger = ledger();
        assert!(ledger.status("kid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_status_is_full_replace() {
        let ledger = ledger();
        assert!(!ledger.set_status("kid-1", false).await.unwrap());
        assert!(!ledger.status("kid-1").await.unwrap());

        assert!(ledger.set_status("kid-1", true).await.unwrap());
        assert!(ledger.status("kid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_status_is_per_kid() {
        let ledger = ledger();
        ledger.set_status("kid-1", false).await.unwrap();
        assert!(!ledger.status("kid-1").await.unwrap());
        assert!(ledger.status("kid-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_restores_default() {
        let ledger = ledger();
        ledger.set_status("kid-1", false).await.unwrap();
        ledger.delete("kid-1").await.unwrap();
        assert!(ledger.status("kid-1").await.unwrap());
    }
}
