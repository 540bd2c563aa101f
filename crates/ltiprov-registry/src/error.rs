//! Registry error types.
//!
//! Every failure in the platform subsystem surfaces to the caller with its
//! specific kind; nothing is absorbed or retried internally. Retry and
//! backoff policy, where desired, belongs to the caller.

use ltiprov_storage::StorageError;

/// Errors that can occur in the platform registry.
///
/// `Clone` is required because token results are fanned out to every
/// waiter of a single-flight acquisition group.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Registration collided with an existing `(platform_url, client_id)` pair.
    #[error("Platform already registered: {platform_url} [{client_id}]")]
    IdentityConflict {
        /// The platform URL of the colliding registration.
        platform_url: String,
        /// The client id of the colliding registration.
        client_id: String,
    },

    /// Unrecognized message-verification method.
    #[error("Invalid method '{method}': valid methods are RSA_KEY, JWK_KEY, JWK_SET")]
    InvalidMethod {
        /// The rejected method string.
        method: String,
    },

    /// No key material exists for the given kid.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The kid that has no stored key.
        kid: String,
    },

    /// The upstream token grant failed or was cancelled.
    #[error("Token acquisition failed: {message}")]
    TokenAcquisition {
        /// Description of the acquisition failure.
        message: String,
    },

    /// One or more resources targeted by a platform delete failed to remove.
    #[error("Partial delete: failed to remove {}", failed.join(", "))]
    PartialDelete {
        /// The collections whose delete failed.
        failed: Vec<String>,
    },

    /// A persistence operation failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// Key material could not be generated or encoded.
    #[error("Key material error: {message}")]
    KeyMaterial {
        /// Description of the key material failure.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl RegistryError {
    /// Creates a new `IdentityConflict` error.
    #[must_use]
    pub fn identity_conflict(
        platform_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self::IdentityConflict {
            platform_url: platform_url.into(),
            client_id: client_id.into(),
        }
    }

    /// Creates a new `InvalidMethod` error.
    #[must_use]
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::InvalidMethod {
            method: method.into(),
        }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `TokenAcquisition` error.
    #[must_use]
    pub fn token_acquisition(message: impl Into<String>) -> Self {
        Self::TokenAcquisition {
            message: message.into(),
        }
    }

    /// Creates a new `PartialDelete` error.
    #[must_use]
    pub fn partial_delete(failed: Vec<String>) -> Self {
        Self::PartialDelete { failed }
    }

    /// Creates a new `KeyMaterial` error.
    #[must_use]
    pub fn key_material(message: impl Into<String>) -> Self {
        Self::KeyMaterial {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an identity conflict.
    #[must_use]
    pub fn is_identity_conflict(&self) -> bool {
        matches!(self, Self::IdentityConflict { .. })
    }

    /// Returns `true` if this is a missing-key error.
    #[must_use]
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// Returns `true` if this is a token acquisition failure.
    #[must_use]
    pub fn is_token_acquisition(&self) -> bool {
        matches!(self, Self::TokenAcquisition { .. })
    }

    /// Returns `true` if this is a partial delete.
    #[must_use]
    pub fn is_partial_delete(&self) -> bool {
        matches!(self, Self::PartialDelete { .. })
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::identity_conflict("https://lms.example.com", "client-1");
        assert_eq!(
            err.to_string(),
            "Platform already registered: https://lms.example.com [client-1]"
        );

        let err = RegistryError::invalid_method("BAD_METHOD");
        assert_eq!(
            err.to_string(),
            "Invalid method 'BAD_METHOD': valid methods are RSA_KEY, JWK_KEY, JWK_SET"
        );

        let err = RegistryError::partial_delete(vec!["public_key".into(), "private_key".into()]);
        assert_eq!(
            err.to_string(),
            "Partial delete: failed to remove public_key, private_key"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(RegistryError::identity_conflict("u", "c").is_identity_conflict());
        assert!(RegistryError::key_not_found("kid").is_key_not_found());
        assert!(RegistryError::token_acquisition("down").is_token_acquisition());
        assert!(RegistryError::partial_delete(vec![]).is_partial_delete());
        assert!(!RegistryError::key_not_found("kid").is_identity_conflict());
    }

    #[test]
    fn test_from_storage_error() {
        let err: RegistryError = StorageError::encryption("bad key").into();
        assert!(matches!(err, RegistryError::Storage { .. }));
        assert_eq!(err.to_string(), "Storage error: Encryption error: bad key");
    }
}
