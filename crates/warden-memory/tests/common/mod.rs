//! Shared wiring for integration tests: memory store, local cache, grant
//! manager, token codec and guard.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;
use warden_authz::{
    ActionHierarchy, AuthzConfig, CacheBackend, EdgePermissionCache, Effect, EnforcementGuard,
    GrantManager, NewGroup, PolicyResolver, TenantId, TokenCodec,
};
use warden_memory::MemoryPolicyStore;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct Harness {
    pub store: Arc<MemoryPolicyStore>,
    pub resolver: Arc<PolicyResolver>,
    pub cache: Arc<EdgePermissionCache>,
    pub grants: GrantManager,
    pub tokens: Arc<TokenCodec>,
    pub guard: Arc<EnforcementGuard>,
    pub tenant: TenantId,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = AuthzConfig::default();
        config.token.secret = SECRET.to_string();

        let store = Arc::new(MemoryPolicyStore::new());
        let resolver = Arc::new(PolicyResolver::new(
            store.clone(),
            Arc::new(ActionHierarchy::from_config(&config.actions)),
            &config.store,
        ));
        let cache = Arc::new(EdgePermissionCache::new(
            CacheBackend::new_local(),
            resolver.clone(),
            &config.cache,
        ));
        let grants = GrantManager::new(store.clone(), store.clone(), cache.clone(), &config);
        let tokens = Arc::new(
            TokenCodec::new(&config.token, store.clone())
                .unwrap()
                .with_ledger_timeout(config.store.operation_timeout),
        );
        let guard = Arc::new(EnforcementGuard::new(tokens.clone(), cache.clone()));

        Self {
            store,
            resolver,
            cache,
            grants,
            tokens,
            guard,
            tenant: TenantId::new("acme"),
        }
    }

    pub async fn principal(&self, name: &str) -> Uuid {
        self.grants.register_principal(None, name).await.unwrap().id
    }

    pub async fn permission(&self, resource: &str, action: &str) -> Uuid {
        self.grants
            .create_permission(resource, action, None)
            .await
            .unwrap()
            .id
    }

    pub async fn group(&self, name: &str) -> Uuid {
        self.grants
            .create_group(NewGroup::new(name, self.tenant.clone()))
            .await
            .unwrap()
            .id
    }

    pub async fn join(&self, principal: Uuid, group: Uuid) {
        self.grants
            .add_group_member(principal, group, self.tenant.clone())
            .await
            .unwrap();
    }

    pub async fn grant(&self, principal: Uuid, permission: Uuid, effect: Effect) {
        self.grants
            .assign_user_permission(principal, permission, self.tenant.clone(), effect, None)
            .await
            .unwrap();
    }

    pub async fn grant_group(&self, group: Uuid, permission: Uuid, effect: Effect) {
        self.grants
            .assign_group_permission(group, permission, effect, None)
            .await
            .unwrap();
    }

    pub async fn can(&self, principal: Uuid, resource: &str, action: &str) -> bool {
        self.resolver
            .has_permission(principal, resource, action, &self.tenant, None)
            .await
            .unwrap()
    }
}

pub fn is_self_condition() -> Vec<Value> {
    vec![json!({ "field": "isSelf", "operator": "eq", "value": true })]
}
