//! Grant management service.
//!
//! Every operation follows the same contract:
//!
//! 1. validate references (`NotFound`) and input (`Validation`),
//! 2. refuse protected-group rename/delete (`Forbidden`),
//! 3. commit the mutation; the store bumps every affected principal's auth
//!    version inside the same unit,
//! 4. delete the affected `(principal, tenant)` cache partitions.
//!
//! Step 4 is best effort. If it fails, the bumped version still keeps
//! tokens issued afterwards away from stale entries, and the TTL bounds the
//! rest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::cache::EdgePermissionCache;
use crate::config::AuthzConfig;
use crate::error::AuthzError;
use crate::ledger::AuthVersionLedger;
use crate::policy::parse_conditions;
use crate::storage::{CommitReceipt, PolicyMutation, PolicyStore, bounded};
use crate::types::{
    Effect, Group, GroupPermission, GroupUpdate, NewGroup, Permission, Principal,
    ProtectedGroups, TenantId, UserGroup, UserPermission,
};

/// Mutation surface for permissions, groups, grants and memberships.
pub struct GrantManager {
    store: Arc<dyn PolicyStore>,
    ledger: Arc<dyn AuthVersionLedger>,
    cache: Arc<EdgePermissionCache>,
    protected: ProtectedGroups,
    global_tenant: TenantId,
    timeout: Duration,
}

impl GrantManager {
    /// Creates a grant manager.
    pub fn new(
        store: Arc<dyn PolicyStore>,
        ledger: Arc<dyn AuthVersionLedger>,
        cache: Arc<EdgePermissionCache>,
        config: &AuthzConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
            protected: ProtectedGroups::new(config.protected_groups.iter().cloned()),
            global_tenant: TenantId::new(config.global_tenant.clone()),
            timeout: config.store.operation_timeout,
        }
    }

    /// The underlying store, for read-only queries.
    pub fn store(&self) -> &dyn PolicyStore {
        self.store.as_ref()
    }

    /// The protected group names.
    pub fn protected_groups(&self) -> &ProtectedGroups {
        &self.protected
    }

    /// The reserved global tenant.
    pub fn global_tenant(&self) -> &TenantId {
        &self.global_tenant
    }

    /// Time limit applied to each store call.
    pub fn operation_timeout(&self) -> Duration {
        self.timeout
    }

    // =========================================================================
    // Tenant scope
    // =========================================================================

    /// Checks that a caller acting in `caller` may write into `target`.
    ///
    /// Only callers in the global tenant reach other tenants.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when a tenant-scoped caller targets another tenant.
    pub fn authorize_tenant(&self, caller: &TenantId, target: &TenantId) -> AuthzResult<()> {
        if caller == target || *caller == self.global_tenant {
            return Ok(());
        }
        Err(AuthzError::forbidden(format!(
            "tenant '{caller}' cannot manage tenant '{target}'"
        )))
    }

    /// Loads a group a caller acting in `caller` may administer: rename,
    /// delete, or change its grants.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing group, `Forbidden` for a group outside the
    /// caller's tenant.
    pub async fn managed_group(&self, caller: &TenantId, group_id: Uuid) -> AuthzResult<Group> {
        let group = self.require_group(group_id).await?;
        self.authorize_tenant(caller, &group.tenant)?;
        Ok(group)
    }

    /// Loads a group a caller acting in `caller` may add members to or
    /// remove members from.
    ///
    /// Besides the caller's own groups, tenant-scoped callers reach
    /// unprotected global groups. Protected groups stay with global callers.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing group, `Forbidden` otherwise.
    pub async fn joinable_group(&self, caller: &TenantId, group_id: Uuid) -> AuthzResult<Group> {
        let group = self.require_group(group_id).await?;
        if *caller == self.global_tenant || group.tenant == *caller {
            return Ok(group);
        }
        if group.tenant == self.global_tenant && !self.protected.contains(&group.name) {
            return Ok(group);
        }
        Err(AuthzError::forbidden(format!(
            "tenant '{caller}' cannot manage members of group '{}'",
            group.name
        )))
    }

    // =========================================================================
    // Principals and permissions
    // =========================================================================

    /// Registers a principal and creates its auth version at 1.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name or an id already in use.
    pub async fn register_principal(
        &self,
        id: Option<Uuid>,
        display_name: &str,
    ) -> AuthzResult<Principal> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AuthzError::validation("display name is required"));
        }
        let principal = match id {
            Some(id) => Principal::with_id(id, display_name),
            None => Principal::new(display_name),
        };
        self.apply(PolicyMutation::RegisterPrincipal(principal.clone()))
            .await?;
        Ok(principal)
    }

    /// Adds a permission to the catalog.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed or duplicate `(resource, action)`.
    pub async fn create_permission(
        &self,
        resource: &str,
        action: &str,
        description: Option<String>,
    ) -> AuthzResult<Permission> {
        let mut permission = Permission::new(resource.trim(), action.trim());
        permission.description = description;
        permission.validate()?;

        self.apply(PolicyMutation::CreatePermission(permission.clone()))
            .await?;
        Ok(permission)
    }

    /// Resets a principal's auth version to 1 and drops its cached
    /// permissions in every tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown principal.
    pub async fn force_reauthorization(&self, principal_id: Uuid) -> AuthzResult<()> {
        self.require_principal(principal_id).await?;
        bounded(self.timeout, "reset_version", self.ledger.reset(principal_id)).await?;
        self.cache.invalidate_principal(principal_id).await;

        tracing::info!(principal = %principal_id, "Forced re-authorization");
        Ok(())
    }

    // =========================================================================
    // Direct grants
    // =========================================================================

    /// Assigns (or replaces) a direct grant.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing principal or permission, `Validation` for a
    /// malformed condition or tenant.
    pub async fn assign_user_permission(
        &self,
        principal_id: Uuid,
        permission_id: Uuid,
        tenant: TenantId,
        effect: Effect,
        conditions: Option<&[Value]>,
    ) -> AuthzResult<UserPermission> {
        tenant.validate()?;
        self.require_principal(principal_id).await?;
        self.require_permission(permission_id).await?;
        let conditions = parse_conditions(conditions)?;

        let grant = UserPermission {
            principal_id,
            permission_id,
            tenant,
            effect,
            conditions,
            granted_at: OffsetDateTime::now_utc(),
        };
        self.apply(PolicyMutation::AssignUserPermission(grant.clone()))
            .await?;
        Ok(grant)
    }

    /// Revokes a direct grant.
    ///
    /// # Errors
    ///
    /// `NotFound` if the principal, permission or grant does not exist.
    pub async fn revoke_user_permission(
        &self,
        principal_id: Uuid,
        permission_id: Uuid,
        tenant: TenantId,
    ) -> AuthzResult<()> {
        tenant.validate()?;
        self.require_principal(principal_id).await?;
        self.require_permission(permission_id).await?;

        self.apply(PolicyMutation::RevokeUserPermission {
            principal_id,
            permission_id,
            tenant,
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Memberships
    // =========================================================================

    /// Adds a principal to a group in a tenant.
    ///
    /// A group owned by a tenant only accepts memberships in that tenant;
    /// groups of the global tenant accept memberships in any tenant.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing principal or group, `Validation` for a
    /// tenant the group does not serve.
    pub async fn add_group_member(
        &self,
        principal_id: Uuid,
        group_id: Uuid,
        tenant: TenantId,
    ) -> AuthzResult<UserGroup> {
        tenant.validate()?;
        self.require_principal(principal_id).await?;
        let group = self.require_group(group_id).await?;
        if group.tenant != tenant && group.tenant != self.global_tenant {
            return Err(AuthzError::validation(format!(
                "group '{}' belongs to tenant '{}' and cannot grant membership in '{}'",
                group.name, group.tenant, tenant
            )));
        }

        let membership = UserGroup::new(principal_id, group_id, tenant);
        self.apply(PolicyMutation::AddMembership(membership.clone()))
            .await?;
        Ok(membership)
    }

    /// Removes a principal from a group in a tenant.
    ///
    /// # Errors
    ///
    /// `NotFound` if the principal, group or membership does not exist.
    pub async fn remove_group_member(
        &self,
        principal_id: Uuid,
        group_id: Uuid,
        tenant: TenantId,
    ) -> AuthzResult<()> {
        tenant.validate()?;
        self.require_principal(principal_id).await?;
        self.require_group(group_id).await?;

        self.apply(PolicyMutation::RemoveMembership {
            principal_id,
            group_id,
            tenant,
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Creates a group.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank name, bad tenant, or duplicate
    /// `(name, tenant)`.
    pub async fn create_group(&self, input: NewGroup) -> AuthzResult<Group> {
        input.validate()?;
        input.tenant.validate()?;

        let group = input.into_group();
        self.apply(PolicyMutation::CreateGroup(group.clone())).await?;
        Ok(group)
    }

    /// Updates a group's name, description or active flag.
    ///
    /// Toggling `active` changes members' effective grants and bumps them.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing group, `Forbidden` when renaming a protected
    /// group, `Validation` for a bad or duplicate name.
    pub async fn update_group(&self, group_id: Uuid, update: GroupUpdate) -> AuthzResult<Group> {
        let receipt = self
            .apply(PolicyMutation::UpdateGroup {
                group_id,
                update,
                protected: self.protected.clone(),
            })
            .await?;
        receipt
            .group
            .ok_or_else(|| AuthzError::internal("store did not return the updated group"))
    }

    /// Deletes a group together with its grants and memberships.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing group, `Forbidden` for a protected group.
    pub async fn delete_group(&self, group_id: Uuid) -> AuthzResult<()> {
        let group = self.require_group(group_id).await?;
        if self.protected.contains(&group.name) {
            return Err(AuthzError::forbidden(format!(
                "group '{}' is protected and cannot be deleted",
                group.name
            )));
        }

        self.apply(PolicyMutation::DeleteGroup { group_id }).await?;
        Ok(())
    }

    // =========================================================================
    // Group grants
    // =========================================================================

    /// Assigns (or replaces) a group grant. Every member is bumped.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing group or permission, `Validation` for a
    /// malformed condition.
    pub async fn assign_group_permission(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
        effect: Effect,
        conditions: Option<&[Value]>,
    ) -> AuthzResult<GroupPermission> {
        self.require_group(group_id).await?;
        self.require_permission(permission_id).await?;
        let conditions = parse_conditions(conditions)?;

        let grant = GroupPermission {
            group_id,
            permission_id,
            effect,
            conditions,
            granted_at: OffsetDateTime::now_utc(),
        };
        self.apply(PolicyMutation::AssignGroupPermission(grant.clone()))
            .await?;
        Ok(grant)
    }

    /// Revokes a group grant. Every member is bumped.
    ///
    /// # Errors
    ///
    /// `NotFound` if the group, permission or grant does not exist.
    pub async fn revoke_group_permission(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> AuthzResult<()> {
        self.require_group(group_id).await?;
        self.require_permission(permission_id).await?;

        self.apply(PolicyMutation::RevokeGroupPermission {
            group_id,
            permission_id,
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn require_principal(&self, id: Uuid) -> AuthzResult<Principal> {
        bounded(self.timeout, "find_principal", self.store.find_principal(id))
            .await?
            .ok_or_else(|| AuthzError::not_found("principal", id))
    }

    async fn require_permission(&self, id: Uuid) -> AuthzResult<Permission> {
        bounded(self.timeout, "find_permission", self.store.find_permission(id))
            .await?
            .ok_or_else(|| AuthzError::not_found("permission", id))
    }

    async fn require_group(&self, id: Uuid) -> AuthzResult<Group> {
        bounded(self.timeout, "find_group", self.store.find_group(id))
            .await?
            .ok_or_else(|| AuthzError::not_found("group", id))
    }

    async fn apply(&self, mutation: PolicyMutation) -> AuthzResult<CommitReceipt> {
        let kind = mutation.kind();
        let receipt = bounded(self.timeout, kind, self.store.commit(mutation)).await?;

        for affected in &receipt.affected {
            tracing::debug!(
                principal = %affected.principal_id,
                version = affected.version,
                "Auth version bumped"
            );
            for tenant in &affected.tenants {
                self.cache.invalidate(affected.principal_id, tenant).await;
            }
        }

        tracing::info!(
            mutation = kind,
            affected = receipt.affected.len(),
            "Committed policy mutation"
        );
        Ok(receipt)
    }
}
