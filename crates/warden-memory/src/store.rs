use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use warden_authz::AuthzResult;
use warden_authz::ledger::AuthVersionLedger;
use warden_authz::storage::{CommitReceipt, PolicyMutation, PolicyStore, PrincipalGrants};
use warden_authz::types::{
    Group, GroupPermission, Permission, Principal, TenantId, UserGroup, UserPermission,
};

use crate::state::PolicyState;

/// In-memory policy store and auth version ledger.
///
/// A single `RwLock` guards all state:
/// - every mutation runs validation, write and version bump under one write
///   guard, so it is applied entirely or not at all
/// - `load_grants` reads grants and version under one read guard, so the
///   grants always match the version returned with them
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyStore {
    state: Arc<RwLock<PolicyState>>,
}

impl MemoryPolicyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn find_principal(&self, id: Uuid) -> AuthzResult<Option<Principal>> {
        Ok(self.state.read().await.principals.get(&id).cloned())
    }

    async fn find_permission(&self, id: Uuid) -> AuthzResult<Option<Permission>> {
        Ok(self.state.read().await.permissions.get(&id).cloned())
    }

    async fn find_permission_by_key(
        &self,
        resource: &str,
        action: &str,
    ) -> AuthzResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permission_by_key(resource, action)
            .cloned())
    }

    async fn list_permissions(&self) -> AuthzResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        permissions.sort_by_key(Permission::key);
        Ok(permissions)
    }

    async fn find_group(&self, id: Uuid) -> AuthzResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn find_group_by_name(
        &self,
        name: &str,
        tenant: &TenantId,
    ) -> AuthzResult<Option<Group>> {
        Ok(self.state.read().await.group_by_name(name, tenant).cloned())
    }

    async fn list_groups(&self, tenant: Option<&TenantId>) -> AuthzResult<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .values()
            .filter(|g| tenant.is_none_or(|t| &g.tenant == t))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tenant.cmp(&b.tenant)));
        Ok(groups)
    }

    async fn group_permissions(&self, group_id: Uuid) -> AuthzResult<Vec<GroupPermission>> {
        Ok(self
            .state
            .read()
            .await
            .grants_of_group(group_id)
            .cloned()
            .collect())
    }

    async fn group_members(&self, group_id: Uuid) -> AuthzResult<Vec<UserGroup>> {
        Ok(self
            .state
            .read()
            .await
            .members_of(group_id)
            .cloned()
            .collect())
    }

    async fn user_permissions(
        &self,
        principal_id: Uuid,
        tenant: Option<&TenantId>,
    ) -> AuthzResult<Vec<UserPermission>> {
        let state = self.state.read().await;
        Ok(state
            .user_permissions
            .values()
            .filter(|g| g.principal_id == principal_id)
            .filter(|g| tenant.is_none_or(|t| &g.tenant == t))
            .cloned()
            .collect())
    }

    async fn memberships(&self, principal_id: Uuid) -> AuthzResult<Vec<UserGroup>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .values()
            .filter(|m| m.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn load_grants(
        &self,
        principal_id: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<PrincipalGrants> {
        self.state.read().await.load_grants(principal_id, tenant)
    }

    async fn commit(&self, mutation: PolicyMutation) -> AuthzResult<CommitReceipt> {
        let kind = mutation.kind();
        let mut state = self.state.write().await;
        let receipt = state.apply(mutation)?;
        tracing::trace!(mutation = kind, bumped = receipt.affected.len(), "Applied mutation");
        Ok(receipt)
    }
}

#[async_trait]
impl AuthVersionLedger for MemoryPolicyStore {
    async fn current(&self, principal_id: Uuid) -> AuthzResult<i64> {
        Ok(self.state.read().await.version(principal_id))
    }

    async fn ensure(&self, principal_id: Uuid) -> AuthzResult<i64> {
        let mut state = self.state.write().await;
        let version = state.version(principal_id);
        state.versions.insert(principal_id, version);
        Ok(version)
    }

    async fn bump(&self, principal_ids: &[Uuid]) -> AuthzResult<Vec<(Uuid, i64)>> {
        Ok(self.state.write().await.bump(principal_ids))
    }

    async fn reset(&self, principal_id: Uuid) -> AuthzResult<()> {
        self.state
            .write()
            .await
            .versions
            .insert(principal_id, warden_authz::INITIAL_AUTH_VERSION);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use warden_authz::error::AuthzError;
    use warden_authz::types::Effect;

    #[tokio::test]
    async fn test_ledger_lifecycle() {
        let store = MemoryPolicyStore::new();
        let id = Uuid::new_v4();

        assert_eq!(store.current(id).await.unwrap(), 1);
        assert_eq!(store.ensure(id).await.unwrap(), 1);
        assert_eq!(store.bump(&[id]).await.unwrap(), vec![(id, 2)]);
        assert_eq!(store.ensure(id).await.unwrap(), 2);
        store.reset(id).await.unwrap();
        assert_eq!(store.current(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_grants_reads_version_with_grants() {
        let store = MemoryPolicyStore::new();
        let principal = Principal::new("Dana");
        let permission = Permission::new("staff", "read");
        let acme = TenantId::new("acme");
        store
            .commit(PolicyMutation::RegisterPrincipal(principal.clone()))
            .await
            .unwrap();
        store
            .commit(PolicyMutation::CreatePermission(permission.clone()))
            .await
            .unwrap();

        let receipt = store
            .commit(PolicyMutation::AssignUserPermission(UserPermission {
                principal_id: principal.id,
                permission_id: permission.id,
                tenant: acme.clone(),
                effect: Effect::Allow,
                conditions: Vec::new(),
                granted_at: OffsetDateTime::now_utc(),
            }))
            .await
            .unwrap();
        assert_eq!(receipt.version_of(principal.id), Some(2));

        let loaded = store.load_grants(principal.id, &acme).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.grants.len(), 1);
        assert_eq!(loaded.grants[0].resource, "staff");

        let other_tenant = store
            .load_grants(principal.id, &TenantId::new("globex"))
            .await
            .unwrap();
        assert!(other_tenant.grants.is_empty());

        let missing = store.load_grants(Uuid::new_v4(), &acme).await.unwrap_err();
        assert!(matches!(missing, AuthzError::NotFound { entity: "principal", .. }));
    }

    #[tokio::test]
    async fn test_list_groups_by_tenant() {
        let store = MemoryPolicyStore::new();
        for (name, tenant) in [("b", "acme"), ("a", "acme"), ("c", "globex")] {
            store
                .commit(PolicyMutation::CreateGroup(Group::new(name, TenantId::new(tenant))))
                .await
                .unwrap();
        }

        let acme = store.list_groups(Some(&TenantId::new("acme"))).await.unwrap();
        assert_eq!(
            acme.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(store.list_groups(None).await.unwrap().len(), 3);
    }
}
