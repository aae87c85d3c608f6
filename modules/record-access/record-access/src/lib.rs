//! Record Access Module
//!
//! Exposes schema-described record types under access layer paths and
//! guards every request with an ordered chain of security models.
//!
//! ## Architecture
//!
//! ### Domain Layer (`record_access::domain`)
//! - `builder` - `RecordApiBuilder`: registers record types and mounts them
//! - `mount` - one record type under one layer path; filter seeding
//! - `chain` - the authorization chain (lazy user resolution, first grant wins)
//! - `models` - `OpenAccess`, `Ownership`, `RoleMembership`, `DenyAll`
//! - `service` - per-mount endpoints (`get_one`, `update_one`, `delete_one`,
//!   `list`, `create`) with empty-result disambiguation
//! - `ports` - `RecordStore`, `Authenticator`, `RoleDirectory`
//! - **Rule:** MUST NOT import `api::*`
//!
//! ### Infrastructure Layer (`record_access::infra`)
//! - `storage` - in-memory `RecordStore`
//! - `roles` - `RoleDirectory` backed by membership and role records
//! - `authn` - static token `Authenticator`
//!
//! ### API Layer (`record_access::api`)
//! - `rest` - axum routes per mount and error-to-status mapping
//!
//! ## Example
//!
//! ```ignore
//! let store = Arc::new(InMemoryStore::default());
//! let authn = Arc::new(StaticTokenAuthenticator::from_config(&authn_config));
//! let api = RecordApiBuilder::new(store, authn, RecordAccessConfig::default())
//!     .register("note", &note)?
//!     .mount("note", &[], vec![SecurityModel::ownership("note")])?
//!     .build()
//!     .await?;
//! let app = record_access::router(&api);
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

// === PUBLIC API ===
pub use api::rest::router;
pub use config::{
    AuthnMode, CacheConfig, IdentityConfig, RecordAccessConfig, StaticAuthnConfig, TokenMapping,
};
pub use domain::builder::{RecordApi, RecordApiBuilder};
pub use domain::error::{AccessError, AuthnError, ConfigError};
pub use domain::models::{EmptyResultPolicy, Ownership, RoleCache, RoleMembership, SecurityModel};
pub use domain::operation::Operation;
pub use domain::ports::{
    Authenticator, Credentials, FindOptions, Membership, Record, RecordStore, Role, RoleDirectory,
};
pub use domain::service::Endpoints;
pub use infra::authn::StaticTokenAuthenticator;
pub use infra::roles::StoreRoleDirectory;
pub use infra::storage::InMemoryStore;

// === INTERNAL MODULES ===
// Exposed for integration tests; use the re-exports above.
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;

#[cfg(test)]
mod test_support;
