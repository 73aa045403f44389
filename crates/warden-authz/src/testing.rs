//! Minimal store for unit tests inside this crate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthzResult;
use crate::error::AuthzError;
use crate::ledger::{AuthVersionLedger, INITIAL_AUTH_VERSION};
use crate::policy::{EffectiveGrant, GrantSource};
use crate::storage::{CommitReceipt, PolicyMutation, PolicyStore, PrincipalGrants};
use crate::types::{
    Effect, Group, GroupPermission, Permission, Principal, TenantId, UserGroup, UserPermission,
};

pub(crate) fn allow(resource: &str, action: &str) -> EffectiveGrant {
    EffectiveGrant::new(
        GrantSource::Direct,
        &Permission::new(resource, action),
        Effect::Allow,
        Vec::new(),
    )
}

/// Serves canned grants per `(principal, tenant)`.
#[derive(Default)]
pub(crate) struct StaticStore {
    grants: Mutex<HashMap<(Uuid, TenantId), PrincipalGrants>>,
    versions: Mutex<HashMap<Uuid, i64>>,
    loads: AtomicUsize,
    fail: AtomicBool,
}

impl StaticStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(
        &self,
        principal: Uuid,
        tenant: &TenantId,
        version: i64,
        grants: Vec<EffectiveGrant>,
    ) {
        self.grants
            .lock()
            .unwrap()
            .insert((principal, tenant.clone()), PrincipalGrants { version, grants });
        self.versions.lock().unwrap().insert(principal, version);
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_loads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PolicyStore for StaticStore {
    async fn find_principal(&self, id: Uuid) -> AuthzResult<Option<Principal>> {
        let known = self.versions.lock().unwrap().contains_key(&id);
        Ok(known.then(|| Principal::with_id(id, "test")))
    }

    async fn find_permission(&self, _id: Uuid) -> AuthzResult<Option<Permission>> {
        Ok(None)
    }

    async fn find_permission_by_key(
        &self,
        _resource: &str,
        _action: &str,
    ) -> AuthzResult<Option<Permission>> {
        Ok(None)
    }

    async fn list_permissions(&self) -> AuthzResult<Vec<Permission>> {
        Ok(Vec::new())
    }

    async fn find_group(&self, _id: Uuid) -> AuthzResult<Option<Group>> {
        Ok(None)
    }

    async fn find_group_by_name(
        &self,
        _name: &str,
        _tenant: &TenantId,
    ) -> AuthzResult<Option<Group>> {
        Ok(None)
    }

    async fn list_groups(&self, _tenant: Option<&TenantId>) -> AuthzResult<Vec<Group>> {
        Ok(Vec::new())
    }

    async fn group_permissions(&self, _group_id: Uuid) -> AuthzResult<Vec<GroupPermission>> {
        Ok(Vec::new())
    }

    async fn group_members(&self, _group_id: Uuid) -> AuthzResult<Vec<UserGroup>> {
        Ok(Vec::new())
    }

    async fn user_permissions(
        &self,
        _principal_id: Uuid,
        _tenant: Option<&TenantId>,
    ) -> AuthzResult<Vec<UserPermission>> {
        Ok(Vec::new())
    }

    async fn memberships(&self, _principal_id: Uuid) -> AuthzResult<Vec<UserGroup>> {
        Ok(Vec::new())
    }

    async fn load_grants(
        &self,
        principal_id: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<PrincipalGrants> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthzError::storage("store offline"));
        }
        self.grants
            .lock()
            .unwrap()
            .get(&(principal_id, tenant.clone()))
            .cloned()
            .ok_or_else(|| AuthzError::not_found("principal", principal_id))
    }

    async fn commit(&self, mutation: PolicyMutation) -> AuthzResult<CommitReceipt> {
        Err(AuthzError::internal(format!(
            "{} is not supported by the static store",
            mutation.kind()
        )))
    }
}

#[async_trait]
impl AuthVersionLedger for StaticStore {
    async fn current(&self, principal_id: Uuid) -> AuthzResult<i64> {
        Ok(self
            .versions
            .lock()
            .unwrap()
            .get(&principal_id)
            .copied()
            .unwrap_or(INITIAL_AUTH_VERSION))
    }

    async fn ensure(&self, principal_id: Uuid) -> AuthzResult<i64> {
        Ok(*self
            .versions
            .lock()
            .unwrap()
            .entry(principal_id)
            .or_insert(INITIAL_AUTH_VERSION))
    }

    async fn bump(&self, principal_ids: &[Uuid]) -> AuthzResult<Vec<(Uuid, i64)>> {
        let mut versions = self.versions.lock().unwrap();
        Ok(principal_ids
            .iter()
            .map(|id| {
                let version = versions.entry(*id).or_insert(INITIAL_AUTH_VERSION);
                *version += 1;
                (*id, *version)
            })
            .collect())
    }

    async fn reset(&self, principal_id: Uuid) -> AuthzResult<()> {
        self.versions
            .lock()
            .unwrap()
            .insert(principal_id, INITIAL_AUTH_VERSION);
        Ok(())
    }
}
