//! # ltiprov-storage
//!
//! Persistence abstraction for the LTI tool-provider platform registry.
//!
//! This crate provides:
//! - The [`Storage`] trait used by every registry component
//! - AES-256-GCM sealing for collections that hold secrets
//! - An in-memory backend for tests and single-node deployments
//!
//! ## Collections
//!
//! Storage is organized as named collections of JSON records. A collection
//! is either plaintext (platform identity, platform status) or encrypted
//! (keypairs, cached access tokens). Callers signal which by passing
//! `Some(&EncryptionKey)` or `None` to every operation; the backend seals
//! and opens records transparently.
//!
//! ## Modules
//!
//! - [`error`] - Storage error types
//! - [`secrets`] - Encryption key derivation and record sealing
//! - [`traits`] - The `Storage` trait
//! - [`memory`] - In-memory backend

pub mod error;
pub mod memory;
pub mod secrets;
pub mod traits;

pub use error::{ErrorCategory, StorageError};
pub use memory::MemoryStorage;
pub use secrets::{EncryptionKey, SealedRecord};
pub use traits::Storage;

/// Type alias for storage operation results.
pub type StoreResult<T> = Result<T, StorageError>;
