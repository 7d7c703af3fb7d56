#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Hosted backend adapters for the Barberbook route gate.
//!
//! [`HostedAuthService`] implements `gate_auth::AuthService` against the auth
//! API, [`HostedDirectory`] implements the role, permission and approval
//! lookups against the REST API. Both are built once from a [`DirectoryConfig`]
//! and shared behind `Arc`.

mod client;
mod cookies;

pub mod auth_service;
pub mod config;
pub mod directory_store;
pub mod error;

pub use auth_service::HostedAuthService;
pub use config::DirectoryConfig;
pub use directory_store::HostedDirectory;
pub use error::DirectoryError;
