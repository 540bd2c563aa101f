//! Platform registry for an LTI 1.3 tool provider.
//!
//! A *platform* is a learning management system the tool is registered
//! with, identified externally by a generated kid and internally by the
//! `(platform_url, client_id)` pair. This crate owns the full lifecycle
//! of those registrations:
//!
//! - [`PlatformRegistry`] - registration, lookup, listing, deletion
//! - [`Platform`] - a handle over one registration with persist-first
//!   setters and a public JSON projection
//! - [`CredentialStore`] - per-platform RSA keypair custody, private
//!   halves encrypted at rest
//! - [`StatusLedger`] - the active flag, `true` until first written
//! - [`TokenCache`] - access token caching with single-flight refresh
//! - [`AuthConfig`] - message-verification configuration with partial
//!   merge updates
//!
//! Persistence goes through the [`Storage`](ltiprov_storage::Storage)
//! trait; [`MemoryStorage`](ltiprov_storage::MemoryStorage) backs the
//! tests and small deployments.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ltiprov_registry::{
//!     AuthConfig, AuthMethod, HttpTokenAcquirer, PlatformRegistry, PlatformRequest,
//! };
//! use ltiprov_storage::{EncryptionKey, MemoryStorage};
//!
//! # async fn run() -> Result<(), ltiprov_registry::RegistryError> {
//! let registry = PlatformRegistry::new(
//!     Arc::new(MemoryStorage::new()),
//!     EncryptionKey::derive("a long passphrase"),
//!     Arc::new(HttpTokenAcquirer::with_defaults()?),
//! );
//!
//! let platform = registry
//!     .register(PlatformRequest {
//!         platform_url: "https://lms.example.com".to_string(),
//!         client_id: "client-1".to_string(),
//!         name: "Example LMS".to_string(),
//!         authentication_endpoint: "https://lms.example.com/auth".to_string(),
//!         access_token_endpoint: "https://lms.example.com/token".to_string(),
//!         authorization_server: None,
//!         auth_config: AuthConfig::new(AuthMethod::JwkSet, "https://lms.example.com/keys"),
//!     })
//!     .await?;
//!
//! let token = platform
//!     .access_token("https://purl.imsglobal.org/spec/lti-ags/scope/score")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth_config;
pub mod error;
pub mod keys;
pub mod platform;
pub mod registry;
pub mod status;
pub mod token;
pub mod types;

pub use auth_config::{AuthConfig, AuthMethod};
pub use error::RegistryError;
pub use keys::{CredentialStore, Keypair};
pub use platform::Platform;
pub use registry::PlatformRegistry;
pub use status::StatusLedger;
pub use token::{
    AccessToken, HttpAcquirerConfig, HttpTokenAcquirer, TokenAcquirer, TokenCache, TokenKey,
    TokenRequest,
};
pub use types::{PlatformJson, PlatformRecord, PlatformRequest};

/// Convenience result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
