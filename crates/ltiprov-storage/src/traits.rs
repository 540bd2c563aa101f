//! The `Storage` trait.
//!
//! Defines the persistence interface the registry components depend on.
//! Implementations are free to back it with any document-shaped store;
//! an in-memory backend lives in [`crate::memory`].

use async_trait::async_trait;
use serde_json::Value;

use crate::StoreResult;
use crate::secrets::EncryptionKey;

/// Persistence operations over named collections of JSON records.
///
/// Every operation takes an optional [`EncryptionKey`]: `None` means the
/// collection is stored in plaintext, `Some` means record bodies are sealed
/// at rest and the backend must open them before matching or returning.
/// A given collection must be used consistently with the same key mode.
///
/// Filters are JSON objects matched as field subsets: a record matches when
/// every filter field is present in the record with an equal value. An empty
/// filter matches every record in the collection.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns all records matching `filter`, empty if none match.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is not a JSON object or a sealed
    /// record cannot be opened.
    async fn get(
        &self,
        key: Option<&EncryptionKey>,
        collection: &str,
        filter: &Value,
    ) -> StoreResult<Vec<Value>>;

    /// Applies a partial update to every record matching `filter`.
    ///
    /// Patch fields overwrite record fields one level deep; fields absent
    /// from the patch are left untouched. Returns the number of records
    /// modified (zero when nothing matched).
    ///
    /// # Errors
    ///
    /// Returns an error if the filter or patch is not a JSON object or a
    /// sealed record cannot be opened or resealed.
    async fn modify(
        &self,
        key: Option<&EncryptionKey>,
        collection: &str,
        filter: &Value,
        patch: &Value,
    ) -> StoreResult<u64>;

    /// Replaces every record matching `filter` with `record` (upsert).
    ///
    /// When nothing matches, the record is inserted. The filter's fields
    /// double as the plaintext index of an encrypted record, so they must
    /// also be present in `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter or record is not a JSON object or
    /// sealing fails.
    async fn replace(
        &self,
        key: Option<&EncryptionKey>,
        collection: &str,
        filter: &Value,
        record: &Value,
    ) -> StoreResult<()>;

    /// Removes every record matching `filter`, returning the removed count.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is not a JSON object.
    async fn delete(&self, collection: &str, filter: &Value) -> StoreResult<u64>;
}
