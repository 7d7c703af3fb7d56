use crate::{
    errors::{AuthServiceError, LookupError},
    types::UserId,
};
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What the Auth Service knows about the caller of one request
#[derive(Debug, Clone, Default)]
pub struct AuthLookup {
    /// `None` means "no session", which is not an error.
    pub user_id: Option<UserId>,
    /// `Set-Cookie` values produced by a session refresh; must reach the response.
    pub set_cookies: Vec<HeaderValue>,
}

/// Identity provider that issues and validates sessions
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolve the caller from the request headers (cookies, bearer token)
    async fn current_user(&self, headers: &HeaderMap) -> Result<AuthLookup, AuthServiceError>;
}

/// Directory Store query: role names assigned to a user
#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn roles_for(&self, user_id: &UserId) -> Result<BTreeSet<String>, LookupError>;
}

/// Directory Store query: permission names granted to a user through their roles
#[async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn permissions_for(&self, user_id: &UserId) -> Result<BTreeSet<String>, LookupError>;
}

/// Review state of a barber profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Directory Store query: approval state of a user's barber profile
#[async_trait]
pub trait ApprovalLookup: Send + Sync {
    /// `Ok(None)` when the user has no profile at all
    async fn approval_status(&self, user_id: &UserId)
        -> Result<Option<ApprovalStatus>, LookupError>;
}

/// The Directory Store capabilities the policy engine queries
#[derive(Clone)]
pub struct DirectoryLookups {
    pub roles: Arc<dyn RoleLookup>,
    pub permissions: Arc<dyn PermissionLookup>,
    pub approvals: Arc<dyn ApprovalLookup>,
}

impl DirectoryLookups {
    /// Use one store for every capability
    #[must_use]
    pub fn from_store<T>(store: Arc<T>) -> Self
    where
        T: RoleLookup + PermissionLookup + ApprovalLookup + 'static,
    {
        Self {
            roles: store.clone(),
            permissions: store.clone(),
            approvals: store,
        }
    }
}
