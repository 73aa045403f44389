//! Versioned permission cache in front of the policy resolver.
//!
//! Lookup is two explicit phases so the fall-through to live state is
//! visible:
//!
//! 1. [`EdgePermissionCache::lookup`] reads the key built from the token's
//!    `ver` and re-checks the cached version.
//! 2. [`EdgePermissionCache::refresh`] loads grants at the principal's live
//!    auth version and stores them under the live version's key.
//!
//! A refresh racing an invalidation may write an entry computed just before
//! the mutation. That entry is keyed by the old version, which no token
//! issued after the bump carries, and it expires with the TTL.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::config::CacheConfig;
use crate::policy::engine::wrap_evaluation;
use crate::policy::{
    AccessDecision, EffectiveGrant, PermissionSnapshot, PolicyResolver, RequestContext, decide,
};
use crate::types::TenantId;

use super::CacheError;
use super::backend::{BackendStats, CacheBackend};

/// Cached value: the literal snapshot plus the grants it was built from.
///
/// Serialized as MessagePack with named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPermissions {
    /// Versioned `"resource:action"` set.
    pub snapshot: PermissionSnapshot,
    /// Effective grants at `snapshot.version`.
    pub grants: Vec<EffectiveGrant>,
    /// When the entry was computed.
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}

impl CachedPermissions {
    /// Auth version the entry was computed at.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.snapshot.version
    }

    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    fn decode(data: &[u8]) -> Result<Self, CacheError> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the resolver.
    pub misses: u64,
    /// Backend failures treated as misses.
    pub fail_opens: u64,
    /// Entries removed by invalidation.
    pub invalidations: u64,
    /// Backend mode and size.
    pub backend: Option<BackendStats>,
}

/// Request-tier cache of resolved permissions keyed by
/// `(principal, tenant, version)`.
pub struct EdgePermissionCache {
    backend: CacheBackend,
    resolver: Arc<PolicyResolver>,
    prefix: String,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    fail_opens: AtomicU64,
    invalidations: AtomicU64,
}

impl EdgePermissionCache {
    /// Creates a cache over a backend and the authoritative resolver.
    pub fn new(backend: CacheBackend, resolver: Arc<PolicyResolver>, config: &CacheConfig) -> Self {
        Self {
            backend,
            resolver,
            prefix: config.key_prefix.clone(),
            ttl: config.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fail_opens: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// The authoritative resolver behind the cache.
    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    /// Generate cache key for a principal, tenant and version.
    #[inline]
    pub fn key(&self, principal: Uuid, tenant: &TenantId, version: i64) -> String {
        format!("{}:{principal}:{tenant}:{version}", self.prefix)
    }

    #[inline]
    fn tenant_prefix(&self, principal: Uuid, tenant: &TenantId) -> String {
        format!("{}:{principal}:{tenant}:", self.prefix)
    }

    #[inline]
    fn principal_prefix(&self, principal: Uuid) -> String {
        format!("{}:{principal}:", self.prefix)
    }

    /// Phase 1: reads the entry for the token's version.
    ///
    /// Returns `None` on a miss, on a version mismatch, or when the backend
    /// fails.
    pub async fn lookup(
        &self,
        principal: Uuid,
        tenant: &TenantId,
        token_version: i64,
    ) -> Option<CachedPermissions> {
        let key = self.key(principal, tenant, token_version);

        let data = match self.backend.get(&key).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(key = %key, "permission cache miss");
                return None;
            }
            Err(e) => {
                self.fail_opens.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Permission cache read failed, falling back to store"
                );
                return None;
            }
        };

        let cached = match CachedPermissions::decode(&data) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to deserialize cached permissions");
                if let Err(e) = self.backend.delete(&key).await {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Failed to drop undecodable cache entry"
                    );
                }
                return None;
            }
        };

        if cached.version() != token_version {
            tracing::warn!(
                key = %key,
                cached_version = cached.version(),
                token_version,
                "Cached permissions carry a different version than their key"
            );
            return None;
        }

        tracing::debug!(key = %key, "permission cache hit");
        Some(cached)
    }

    /// Phase 2: resolves at the live auth version and caches the result under
    /// the live version's key.
    ///
    /// # Errors
    ///
    /// Propagates resolver errors (`NotFound` for an unknown principal).
    /// Cache write failures are logged and ignored.
    pub async fn refresh(
        &self,
        principal: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<CachedPermissions> {
        let resolved = self.resolver.resolve(principal, tenant).await?;
        let cached = CachedPermissions {
            snapshot: resolved.snapshot(self.resolver.hierarchy()),
            grants: resolved.grants,
            cached_at: OffsetDateTime::now_utc(),
        };

        let key = self.key(principal, tenant, cached.version());
        let write = async {
            let data = cached.encode()?;
            self.backend.set(&key, data, self.ttl).await
        };
        match write.await {
            Ok(()) => {
                tracing::debug!(key = %key, ttl_secs = self.ttl.as_secs(), "permission cache set");
            }
            Err(e) => {
                self.fail_opens.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "Permission cache write failed");
            }
        }

        Ok(cached)
    }

    /// Returns the principal's permissions for a token carrying
    /// `token_version`, reading through the cache.
    ///
    /// The returned version may be newer than `token_version`.
    ///
    /// # Errors
    ///
    /// See [`EdgePermissionCache::refresh`].
    pub async fn permissions(
        &self,
        principal: Uuid,
        tenant: &TenantId,
        token_version: i64,
    ) -> AuthzResult<CachedPermissions> {
        if let Some(cached) = self.lookup(principal, tenant, token_version).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.refresh(principal, tenant).await
    }

    /// Evaluates a request against the cached grants.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown principal; other resolver failures are
    /// wrapped in `Evaluation`.
    pub async fn decide(
        &self,
        principal: Uuid,
        tenant: &TenantId,
        token_version: i64,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> AuthzResult<AccessDecision> {
        let cached = self
            .permissions(principal, tenant, token_version)
            .await
            .map_err(|e| wrap_evaluation(e, principal, resource, action))?;

        let decision = decide(
            &cached.grants,
            self.resolver.hierarchy(),
            resource,
            action,
            context,
        );
        tracing::debug!(
            principal = %principal,
            tenant = %tenant,
            resource,
            action,
            version = cached.version(),
            allowed = decision.is_allowed(),
            "Permission evaluated"
        );
        Ok(decision)
    }

    /// Boolean form of [`EdgePermissionCache::decide`].
    ///
    /// # Errors
    ///
    /// See [`EdgePermissionCache::decide`].
    pub async fn has_permission(
        &self,
        principal: Uuid,
        tenant: &TenantId,
        token_version: i64,
        resource: &str,
        action: &str,
        context: Option<&RequestContext>,
    ) -> AuthzResult<bool> {
        Ok(self
            .decide(principal, tenant, token_version, resource, action, context)
            .await?
            .is_allowed())
    }

    /// Returns the literal snapshot through the cache.
    ///
    /// # Errors
    ///
    /// See [`EdgePermissionCache::refresh`].
    pub async fn snapshot(
        &self,
        principal: Uuid,
        tenant: &TenantId,
        token_version: i64,
    ) -> AuthzResult<PermissionSnapshot> {
        Ok(self
            .permissions(principal, tenant, token_version)
            .await?
            .snapshot)
    }

    /// Deletes every cached version for `(principal, tenant)`.
    pub async fn invalidate(&self, principal: Uuid, tenant: &TenantId) {
        let prefix = self.tenant_prefix(principal, tenant);
        self.delete_prefix(&prefix).await;
    }

    /// Deletes every cached entry for `principal` across tenants.
    pub async fn invalidate_principal(&self, principal: Uuid) {
        let prefix = self.principal_prefix(principal);
        self.delete_prefix(&prefix).await;
    }

    async fn delete_prefix(&self, prefix: &str) {
        match self.backend.delete_prefix(prefix).await {
            Ok(removed) => {
                self.invalidations
                    .fetch_add(removed as u64, Ordering::Relaxed);
                tracing::debug!(prefix = %prefix, removed, "permission cache invalidated");
            }
            Err(e) => {
                tracing::error!(
                    prefix = %prefix,
                    error = %e,
                    "Permission cache invalidation failed"
                );
            }
        }
    }

    /// Drops expired local entries.
    pub fn cleanup_expired(&self) -> usize {
        self.backend.cleanup_expired()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fail_opens: self.fail_opens.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            backend: Some(self.backend.stats()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::policy::ActionHierarchy;
    use crate::testing::{StaticStore, allow};
    use crate::types::Effect;

    fn resolver_over(store: Arc<StaticStore>) -> Arc<PolicyResolver> {
        Arc::new(PolicyResolver::new(
            store,
            Arc::new(ActionHierarchy::default()),
            &StoreConfig::default(),
        ))
    }

    fn cache_over(store: Arc<StaticStore>) -> (EdgePermissionCache, CacheBackend) {
        let backend = CacheBackend::new_local();
        let resolver = resolver_over(store);
        let cache = EdgePermissionCache::new(backend.clone(), resolver, &CacheConfig::default());
        (cache, backend)
    }

    /// A Redis backend pointed at a port nothing listens on.
    fn unreachable_redis() -> CacheBackend {
        let limit = Duration::from_millis(100);
        let mut config = deadpool_redis::Config::from_url("redis://127.0.0.1:1");
        let mut pool = deadpool_redis::PoolConfig::new(1);
        pool.timeouts.wait = Some(limit);
        pool.timeouts.create = Some(limit);
        config.pool = Some(pool);
        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        CacheBackend::new_redis(pool, limit)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let store = Arc::new(StaticStore::new());
        store.set(principal, &tenant, 1, vec![allow("staff", "read")]);
        let (cache, _) = cache_over(store.clone());

        assert!(cache.has_permission(principal, &tenant, 1, "staff", "read", None).await.unwrap());
        assert!(cache.has_permission(principal, &tenant, 1, "staff", "read", None).await.unwrap());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(store.loads(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails_open_to_resolver() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let store = Arc::new(StaticStore::new());
        store.set(principal, &tenant, 2, vec![allow("staff", "read")]);
        let cache = EdgePermissionCache::new(
            unreachable_redis(),
            resolver_over(store.clone()),
            &CacheConfig::default(),
        );

        let read = cache
            .has_permission(principal, &tenant, 2, "staff", "read", None)
            .await
            .unwrap();
        let delete = cache
            .has_permission(principal, &tenant, 2, "staff", "delete", None)
            .await
            .unwrap();
        assert!(read);
        assert!(!delete);

        let stats = cache.stats();
        assert!(stats.fail_opens > 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(store.loads(), 2);
    }

    #[tokio::test]
    async fn test_key_format() {
        let (cache, _) = cache_over(Arc::new(StaticStore::new()));
        let principal = Uuid::nil();
        assert_eq!(
            cache.key(principal, &TenantId::new("acme"), 3),
            "permissions:00000000-0000-0000-0000-000000000000:acme:3"
        );
    }

    #[tokio::test]
    async fn test_stale_token_reads_live_state_after_invalidation() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let store = Arc::new(StaticStore::new());
        store.set(principal, &tenant, 3, vec![allow("staff", "read")]);
        let (cache, backend) = cache_over(store.clone());

        let allowed = cache
            .has_permission(principal, &tenant, 3, "staff", "delete", None)
            .await
            .unwrap();
        assert!(!allowed);

        store.set(
            principal,
            &tenant,
            4,
            vec![allow("staff", "read"), allow("staff", "delete")],
        );
        cache.invalidate(principal, &tenant).await;

        let allowed = cache
            .has_permission(principal, &tenant, 3, "staff", "delete", None)
            .await
            .unwrap();
        assert!(allowed);
        assert!(backend.get(&cache.key(principal, &tenant, 4)).await.unwrap().is_some());
        assert!(backend.get(&cache.key(principal, &tenant, 3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_a_miss() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let store = Arc::new(StaticStore::new());
        store.set(principal, &tenant, 2, vec![allow("staff", "read")]);
        let (cache, backend) = cache_over(store.clone());

        let planted = CachedPermissions {
            snapshot: PermissionSnapshot::default(),
            grants: Vec::new(),
            cached_at: OffsetDateTime::now_utc(),
        };
        backend
            .set(
                &cache.key(principal, &tenant, 2),
                planted.encode().unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(cache.lookup(principal, &tenant, 2).await.is_none());
        assert!(cache.has_permission(principal, &tenant, 2, "staff", "read", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let (cache, backend) = cache_over(Arc::new(StaticStore::new()));
        let key = cache.key(principal, &tenant, 1);
        backend
            .set(&key, vec![0xc1], Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.lookup(principal, &tenant, 1).await.is_none());
        assert!(backend.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_principal_is_not_found() {
        let (cache, _) = cache_over(Arc::new(StaticStore::new()));
        let err = cache
            .has_permission(Uuid::new_v4(), &TenantId::new("acme"), 1, "staff", "read", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found("principal"));
    }

    #[tokio::test]
    async fn test_store_failure_is_wrapped() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let store = Arc::new(StaticStore::new());
        store.set(principal, &tenant, 1, vec![allow("staff", "read")]);
        store.fail_loads(true);
        let (cache, _) = cache_over(store);

        let err = cache
            .has_permission(principal, &tenant, 1, "staff", "read", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::AuthzError::Evaluation { ref resource, .. } if resource == "staff"
        ));
    }

    #[tokio::test]
    async fn test_invalidate_principal_spans_tenants() {
        let principal = Uuid::new_v4();
        let acme = TenantId::new("acme");
        let globex = TenantId::new("globex");
        let store = Arc::new(StaticStore::new());
        store.set(principal, &acme, 1, Vec::new());
        store.set(principal, &globex, 1, Vec::new());
        let (cache, backend) = cache_over(store);

        cache.snapshot(principal, &acme, 1).await.unwrap();
        cache.snapshot(principal, &globex, 1).await.unwrap();
        assert_eq!(backend.stats().local_entries, 2);

        cache.invalidate_principal(principal).await;
        assert_eq!(backend.stats().local_entries, 0);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[tokio::test]
    async fn test_cached_value_keeps_snapshot_and_grants() {
        let principal = Uuid::new_v4();
        let tenant = TenantId::new("acme");
        let store = Arc::new(StaticStore::new());
        let mut deny = allow("staff", "delete");
        deny.effect = Effect::Deny;
        store.set(principal, &tenant, 5, vec![allow("staff", "write"), deny]);
        let (cache, _) = cache_over(store);

        let cached = cache.permissions(principal, &tenant, 5).await.unwrap();
        let roundtrip = CachedPermissions::decode(&cached.encode().unwrap()).unwrap();
        assert_eq!(roundtrip, cached);
        assert_eq!(cached.version(), 5);
        assert!(cached.snapshot.contains("staff", "create"));
        assert_eq!(cached.grants.len(), 2);
    }
}
