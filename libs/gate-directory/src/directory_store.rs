//! Directory Store adapter for the hosted backend's REST API

use async_trait::async_trait;
use gate_auth::{
    ApprovalLookup, ApprovalStatus, LookupError, PermissionLookup, RoleLookup, UserId,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use url::Url;

use crate::{client::BackendClient, config::DirectoryConfig, error::DirectoryError};

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

/// `user_roles` row with its role embedded
#[derive(Debug, Deserialize)]
struct UserRoleRow {
    roles: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct RolePermissions {
    #[serde(default)]
    role_permissions: Vec<RolePermissionRow>,
}

#[derive(Debug, Deserialize)]
struct RolePermissionRow {
    permissions: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct UserPermissionRow {
    roles: Option<RolePermissions>,
}

#[derive(Debug, Deserialize)]
struct BarberProfileRow {
    status: ApprovalStatus,
}

/// Role, permission and approval lookups over the `user_roles`, `roles`,
/// `role_permissions`, `permissions` and `barber_profiles` tables.
pub struct HostedDirectory {
    client: BackendClient,
}

impl HostedDirectory {
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        Ok(Self {
            client: BackendClient::new(config)?,
        })
    }

    fn table_query(&self, table: &str, select: &str, user_id: &UserId) -> Url {
        let mut url = self.client.endpoint(&format!("rest/v1/{table}"));
        url.query_pairs_mut()
            .append_pair("select", select)
            .append_pair("user_id", &format!("eq.{user_id}"));
        url
    }
}

#[async_trait]
impl RoleLookup for HostedDirectory {
    async fn roles_for(&self, user_id: &UserId) -> Result<BTreeSet<String>, LookupError> {
        let url = self.table_query("user_roles", "roles!inner(name)", user_id);
        let rows: Vec<UserRoleRow> = self.client.select(url).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.roles.map(|role| role.name))
            .collect())
    }
}

#[async_trait]
impl PermissionLookup for HostedDirectory {
    async fn permissions_for(&self, user_id: &UserId) -> Result<BTreeSet<String>, LookupError> {
        let url = self.table_query(
            "user_roles",
            "roles!inner(role_permissions(permissions(name)))",
            user_id,
        );
        let rows: Vec<UserPermissionRow> = self.client.select(url).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.roles)
            .flat_map(|role| role.role_permissions)
            .filter_map(|grant| grant.permissions.map(|permission| permission.name))
            .collect())
    }
}

#[async_trait]
impl ApprovalLookup for HostedDirectory {
    async fn approval_status(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ApprovalStatus>, LookupError> {
        let mut url = self.table_query("barber_profiles", "status", user_id);
        url.query_pairs_mut().append_pair("limit", "1");
        let rows: Vec<BarberProfileRow> = self.client.select(url).await?;

        Ok(rows.into_iter().next().map(|row| row.status))
    }
}
