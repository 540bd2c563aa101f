//! Storage error types for the platform registry persistence layer.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A filter or patch argument was not a JSON object.
    #[error("Invalid filter: {message}")]
    InvalidFilter {
        /// Description of why the filter is invalid.
        message: String,
    },

    /// A record could not be serialized or deserialized.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Sealing or opening an encrypted record failed.
    #[error("Encryption error: {message}")]
    Encryption {
        /// Description of the encryption failure.
        message: String,
    },

    /// An encrypted collection was accessed without an encryption key,
    /// or vice versa.
    #[error("Encryption key mismatch for collection '{collection}'")]
    KeyMismatch {
        /// The collection that was accessed.
        collection: String,
    },

    /// An internal backend error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `InvalidFilter` error.
    #[must_use]
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Encryption` error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a new `KeyMismatch` error.
    #[must_use]
    pub fn key_mismatch(collection: impl Into<String>) -> Self {
        Self::KeyMismatch {
            collection: collection.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an encryption-related error.
    #[must_use]
    pub fn is_encryption(&self) -> bool {
        matches!(self, Self::Encryption { .. } | Self::KeyMismatch { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidFilter { .. } => ErrorCategory::Validation,
            Self::Serialization { .. } => ErrorCategory::Validation,
            Self::Encryption { .. } => ErrorCategory::Encryption,
            Self::KeyMismatch { .. } => ErrorCategory::Encryption,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed filter, patch, or record.
    Validation,
    /// Sealing/opening failures.
    Encryption,
    /// Internal backend errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Encryption => write!(f, "encryption"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::invalid_filter("filter must be a JSON object");
        assert_eq!(err.to_string(), "Invalid filter: filter must be a JSON object");

        let err = StorageError::key_mismatch("private_key");
        assert_eq!(
            err.to_string(),
            "Encryption key mismatch for collection 'private_key'"
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::encryption("bad nonce").is_encryption());
        assert!(StorageError::key_mismatch("access_token").is_encryption());
        assert!(!StorageError::internal("oops").is_encryption());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::invalid_filter("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            StorageError::encryption("x").category(),
            ErrorCategory::Encryption
        );
        assert_eq!(
            StorageError::internal("x").category(),
            ErrorCategory::Internal
        );
    }
}
