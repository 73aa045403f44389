//! Policy store interface.
//!
//! The store is the durable source of truth for principals, permissions,
//! groups, grants and memberships. Reads are exposed as individual lookups;
//! writes go through [`PolicyStore::commit`], which applies one
//! [`PolicyMutation`] together with the auth version bump of every affected
//! principal as a single atomic unit.
//!
//! # Implementations
//!
//! - `warden-memory` - in-memory store (one lock around all state)

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::policy::{ActionHierarchy, EffectiveGrant, PermissionSnapshot};
use crate::types::{
    Group, GroupPermission, GroupUpdate, Permission, Principal, ProtectedGroups, TenantId,
    UserGroup, UserPermission,
};

// =============================================================================
// Mutations
// =============================================================================

/// One atomic write unit.
///
/// Every variant that changes a principal's effective grants also bumps that
/// principal's auth version inside the same unit.
#[derive(Debug, Clone)]
pub enum PolicyMutation {
    /// Registers a principal and creates its auth version at 1.
    RegisterPrincipal(Principal),

    /// Adds a permission to the catalog.
    CreatePermission(Permission),

    /// Creates a group.
    CreateGroup(Group),

    /// Patches a group against its current row. Members are bumped when
    /// `active` changes.
    UpdateGroup {
        /// Group to patch.
        group_id: Uuid,
        /// Fields to change.
        update: GroupUpdate,
        /// Names that may not be renamed.
        protected: ProtectedGroups,
    },

    /// Deletes a group with its grants and memberships, bumping former members.
    DeleteGroup {
        /// Group to delete.
        group_id: Uuid,
    },

    /// Inserts or replaces a direct grant.
    AssignUserPermission(UserPermission),

    /// Removes a direct grant.
    RevokeUserPermission {
        /// Grant holder.
        principal_id: Uuid,
        /// Granted permission.
        permission_id: Uuid,
        /// Tenant the grant applies in.
        tenant: TenantId,
    },

    /// Adds a membership (idempotent; still bumps).
    AddMembership(UserGroup),

    /// Removes a membership.
    RemoveMembership {
        /// Member principal.
        principal_id: Uuid,
        /// Group left.
        group_id: Uuid,
        /// Tenant the membership applies in.
        tenant: TenantId,
    },

    /// Inserts or replaces a group grant, bumping every member.
    AssignGroupPermission(GroupPermission),

    /// Removes a group grant, bumping every member.
    RevokeGroupPermission {
        /// Group holding the grant.
        group_id: Uuid,
        /// Granted permission.
        permission_id: Uuid,
    },
}

impl PolicyMutation {
    /// Short name used in logs and timeout errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegisterPrincipal(_) => "register_principal",
            Self::CreatePermission(_) => "create_permission",
            Self::CreateGroup(_) => "create_group",
            Self::UpdateGroup { .. } => "update_group",
            Self::DeleteGroup { .. } => "delete_group",
            Self::AssignUserPermission(_) => "assign_user_permission",
            Self::RevokeUserPermission { .. } => "revoke_user_permission",
            Self::AddMembership(_) => "add_membership",
            Self::RemoveMembership { .. } => "remove_membership",
            Self::AssignGroupPermission(_) => "assign_group_permission",
            Self::RevokeGroupPermission { .. } => "revoke_group_permission",
        }
    }
}

/// A principal whose auth version a commit bumped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedPrincipal {
    /// The principal.
    pub principal_id: Uuid,
    /// Auth version after the bump.
    pub version: i64,
    /// Tenants whose cached permissions are now stale.
    pub tenants: BTreeSet<TenantId>,
}

/// Outcome of a committed mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    /// Principals whose auth version was bumped, in ascending id order.
    pub affected: Vec<AffectedPrincipal>,
    /// The group row as written, for group updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
}

impl CommitReceipt {
    /// Auth version of `principal` after the commit, if it was bumped.
    #[must_use]
    pub fn version_of(&self, principal: Uuid) -> Option<i64> {
        self.affected
            .iter()
            .find(|a| a.principal_id == principal)
            .map(|a| a.version)
    }
}

// =============================================================================
// Resolution input
// =============================================================================

/// A principal's effective grants in one tenant, read together with the auth
/// version they correspond to.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalGrants {
    /// Current auth version.
    pub version: i64,
    /// Direct grants plus grants of active groups the principal belongs to.
    pub grants: Vec<EffectiveGrant>,
}

impl PrincipalGrants {
    /// Builds the literal snapshot for these grants.
    #[must_use]
    pub fn snapshot(&self, hierarchy: &ActionHierarchy) -> PermissionSnapshot {
        PermissionSnapshot::from_grants(self.version, &self.grants, hierarchy)
    }
}

// =============================================================================
// Store trait
// =============================================================================

/// Storage trait for authorization state.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Find a principal by id.
    async fn find_principal(&self, id: Uuid) -> AuthzResult<Option<Principal>>;

    /// Find a permission by id.
    async fn find_permission(&self, id: Uuid) -> AuthzResult<Option<Permission>>;

    /// Find a permission by its `(resource, action)` identity.
    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: &str,
    ) -> AuthzResult<Option<Permission>>;

    /// List the permission catalog ordered by `resource:action`.
    async fn list_permissions(&self) -> AuthzResult<Vec<Permission>>;

    /// Find a group by id.
    async fn find_group(&self, id: Uuid) -> AuthzResult<Option<Group>>;

    /// Find a group by its `(name, tenant)` identity.
    async fn find_group_by_name(&self, name: &str, tenant: &TenantId)
    -> AuthzResult<Option<Group>>;

    /// List groups, optionally restricted to one tenant, ordered by name.
    async fn list_groups(&self, tenant: Option<&TenantId>) -> AuthzResult<Vec<Group>>;

    /// List the grants attached to a group.
    async fn group_permissions(&self, group_id: Uuid) -> AuthzResult<Vec<GroupPermission>>;

    /// List the memberships of a group across tenants.
    async fn group_members(&self, group_id: Uuid) -> AuthzResult<Vec<UserGroup>>;

    /// List a principal's direct grants, optionally restricted to one tenant.
    async fn user_permissions(
        &self,
        principal_id: Uuid,
        tenant: Option<&TenantId>,
    ) -> AuthzResult<Vec<UserPermission>>;

    /// List a principal's memberships across tenants.
    async fn memberships(&self, principal_id: Uuid) -> AuthzResult<Vec<UserGroup>>;

    /// Loads the principal's current auth version and effective grants in one
    /// consistent read.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the principal does not exist.
    async fn load_grants(&self, principal_id: Uuid, tenant: &TenantId)
    -> AuthzResult<PrincipalGrants>;

    /// Applies a mutation and the resulting auth version bumps atomically.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for missing references and `Validation` for
    /// uniqueness violations. Nothing is written when an error is returned.
    async fn commit(&self, mutation: PolicyMutation) -> AuthzResult<CommitReceipt>;
}

/// Runs a store call with an upper bound on its duration.
///
/// # Errors
///
/// Returns `Timeout` naming `operation` if `future` does not finish within
/// `limit`; otherwise whatever `future` returns.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, future: F) -> AuthzResult<T>
where
    F: Future<Output = AuthzResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Store call timed out"
            );
            Err(AuthzError::timeout(operation))
        }
    }
}
