//! Authorization engine configuration.
//!
//! All sections deserialize with `#[serde(default)]`, so a partial TOML
//! document only overrides what it names.
//!
//! # Example (TOML)
//!
//! ```toml
//! [authz]
//! global_tenant = "global"
//! protected_groups = ["super_admin", "admin", "staff"]
//!
//! [authz.actions]
//! universal = ["manage", "admin"]
//! compound = { write = ["create", "update"] }
//!
//! [authz.cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! ttl = "300s"
//! operation_timeout = "250ms"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::AuthzResult;
use crate::error::AuthzError;

/// Default reserved tenant value for global grants and built-in groups.
pub const DEFAULT_GLOBAL_TENANT: &str = "global";

/// Default cache key prefix.
pub const DEFAULT_CACHE_PREFIX: &str = "permissions";

/// Root authorization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Reserved tenant identifier that denotes the global tenant.
    pub global_tenant: String,

    /// Group names that cannot be renamed or deleted.
    pub protected_groups: Vec<String>,

    /// Action hierarchy (universal and compound actions).
    pub actions: ActionConfig,

    /// Edge permission cache settings.
    pub cache: CacheConfig,

    /// Policy store call settings.
    pub store: StoreConfig,

    /// Access token settings.
    pub token: TokenConfig,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            global_tenant: DEFAULT_GLOBAL_TENANT.to_string(),
            protected_groups: vec![
                "super_admin".to_string(),
                "admin".to_string(),
                "staff".to_string(),
            ],
            actions: ActionConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            token: TokenConfig::default(),
        }
    }
}

impl AuthzConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if any section is unusable.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.global_tenant.trim().is_empty() {
            return Err(AuthzError::configuration("global_tenant must not be empty"));
        }
        if self.protected_groups.iter().any(|g| g.trim().is_empty()) {
            return Err(AuthzError::configuration(
                "protected_groups must not contain empty names",
            ));
        }
        self.actions.validate()?;
        self.cache.validate()?;
        self.store.validate()?;
        self.token.validate()?;
        Ok(())
    }
}

/// Action hierarchy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Actions that match every action on their resource.
    pub universal: Vec<String>,

    /// Actions that expand to a fixed set of concrete actions.
    pub compound: BTreeMap<String, Vec<String>>,
}

impl Default for ActionConfig {
    fn default() -> Self {
        let mut compound = BTreeMap::new();
        compound.insert(
            "write".to_string(),
            vec!["create".to_string(), "update".to_string()],
        );
        Self {
            universal: vec!["manage".to_string(), "admin".to_string()],
            compound,
        }
    }
}

impl ActionConfig {
    fn validate(&self) -> AuthzResult<()> {
        if let Some(action) = self
            .universal
            .iter()
            .find(|a| self.compound.contains_key(a.as_str()))
        {
            return Err(AuthzError::configuration(format!(
                "action '{action}' cannot be both universal and compound"
            )));
        }
        for (action, implied) in &self.compound {
            if implied.is_empty() {
                return Err(AuthzError::configuration(format!(
                    "compound action '{action}' must imply at least one action"
                )));
            }
        }
        Ok(())
    }
}

/// Which cache tier backs the edge permission cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Per-instance in-memory map.
    #[default]
    Local,
    /// Shared Redis instance.
    Redis,
}

/// Edge permission cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend selection.
    pub backend: CacheBackendKind,

    /// Redis connection URL (required for the Redis backend).
    pub redis_url: Option<String>,

    /// Maximum Redis pool size.
    pub redis_pool_size: usize,

    /// Key prefix; keys are `{prefix}:{principal}:{tenant}:{version}`.
    pub key_prefix: String,

    /// Time-to-live for cached snapshots.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Upper bound for a single cache call before failing open.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Local,
            redis_url: None,
            redis_pool_size: 16,
            key_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            ttl: Duration::from_secs(300),
            operation_timeout: Duration::from_millis(250),
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> AuthzResult<()> {
        if self.key_prefix.is_empty() || self.key_prefix.contains('*') {
            return Err(AuthzError::configuration(
                "cache.key_prefix must be non-empty and must not contain '*'",
            ));
        }
        if self.ttl.is_zero() {
            return Err(AuthzError::configuration("cache.ttl must be positive"));
        }
        if self.operation_timeout.is_zero() {
            return Err(AuthzError::configuration(
                "cache.operation_timeout must be positive",
            ));
        }
        if self.backend == CacheBackendKind::Redis && self.redis_url.is_none() {
            return Err(AuthzError::configuration(
                "cache.redis_url is required for the redis backend",
            ));
        }
        Ok(())
    }
}

/// Policy store call configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound for a single store call.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(2),
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> AuthzResult<()> {
        if self.operation_timeout.is_zero() {
            return Err(AuthzError::configuration(
                "store.operation_timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Access token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Value of the `iss` claim.
    pub issuer: String,

    /// HMAC secret used to sign tokens.
    pub secret: String,

    /// Token lifetime.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Clock skew tolerated when validating `exp`.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "warden".to_string(),
            secret: String::new(),
            lifetime: Duration::from_secs(3600),
            leeway: Duration::from_secs(30),
        }
    }
}

impl TokenConfig {
    fn validate(&self) -> AuthzResult<()> {
        if self.secret.len() < 32 {
            return Err(AuthzError::configuration(
                "token.secret must be at least 32 bytes",
            ));
        }
        if self.issuer.is_empty() {
            return Err(AuthzError::configuration("token.issuer must not be empty"));
        }
        if self.lifetime.is_zero() {
            return Err(AuthzError::configuration("token.lifetime must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthzConfig {
        let mut config = AuthzConfig::default();
        config.token.secret = "0123456789abcdef0123456789abcdef".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AuthzConfig::default();
        assert_eq!(config.global_tenant, "global");
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.cache.key_prefix, "permissions");
        assert_eq!(config.actions.universal, vec!["manage", "admin"]);
        assert_eq!(
            config.actions.compound.get("write"),
            Some(&vec!["create".to_string(), "update".to_string()])
        );
    }

    #[test]
    fn test_default_requires_secret() {
        assert!(AuthzConfig::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_universal_and_compound_conflict() {
        let mut config = valid_config();
        config
            .actions
            .compound
            .insert("manage".to_string(), vec!["read".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("manage"));
    }

    #[test]
    fn test_redis_requires_url() {
        let mut config = valid_config();
        config.cache.backend = CacheBackendKind::Redis;
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("redis://localhost:6379".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: AuthzConfig = serde_json::from_value(serde_json::json!({
            "cache": { "ttl": "90s", "backend": "redis", "redis_url": "redis://cache" },
            "token": { "secret": "0123456789abcdef0123456789abcdef" }
        }))
        .unwrap();

        assert_eq!(config.cache.ttl, Duration::from_secs(90));
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(
            config.cache.operation_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.global_tenant, "global");
        assert!(config.validate().is_ok());
    }
}
