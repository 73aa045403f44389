use std::sync::Arc;

use warden_authz::grants::AdminSeed;
use warden_authz::{
    ActionHierarchy, BootstrapPlan, BootstrapReport, CacheBackend, EdgePermissionCache,
    EnforcementGuard, GrantManager, PolicyResolver, TokenCodec, bootstrap,
};

use crate::config::AppConfig;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub grants: Arc<GrantManager>,
    pub cache: Arc<EdgePermissionCache>,
    pub guard: Arc<EnforcementGuard>,
    pub tokens: Arc<TokenCodec>,
}

impl AppState {
    /// Wires store, resolver, cache, grant manager, token codec and guard, then
    /// runs the idempotent bootstrap.
    pub async fn init(cfg: &AppConfig) -> anyhow::Result<(Self, BootstrapReport)> {
        let authz = &cfg.authz;
        let store = warden_memory::create_policy_store();

        let hierarchy = Arc::new(ActionHierarchy::from_config(&authz.actions));
        let resolver = Arc::new(PolicyResolver::new(store.clone(), hierarchy, &authz.store));

        let backend = CacheBackend::connect(&authz.cache).await;
        let cache = Arc::new(EdgePermissionCache::new(backend, resolver, &authz.cache));

        let grants = Arc::new(GrantManager::new(
            store.clone(),
            store.clone(),
            cache.clone(),
            authz,
        ));
        let tokens = Arc::new(
            TokenCodec::new(&authz.token, store)?
                .with_ledger_timeout(authz.store.operation_timeout),
        );
        let guard = Arc::new(EnforcementGuard::new(tokens.clone(), cache.clone()));

        let plan = BootstrapPlan {
            admin: cfg.bootstrap.admin_principal.map(|id| AdminSeed {
                id,
                display_name: cfg.bootstrap.admin_name.clone(),
            }),
        };
        let report = bootstrap(&grants, &plan).await?;

        Ok((
            Self {
                grants,
                cache,
                guard,
                tokens,
            },
            report,
        ))
    }
}
