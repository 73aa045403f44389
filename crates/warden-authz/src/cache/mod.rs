//! Edge permission cache.
//!
//! ## Key Format
//!
//! `{prefix}:{principal}:{tenant}:{version}`, e.g.
//! `permissions:7b0c...:acme:3`
//!
//! ## Lookup
//!
//! ```text
//! token ver ─▶ key(ver) ─▶ GET ─hit─▶ cached grants
//!                           │
//!                          miss ─▶ resolver (live version + grants) ─▶ SET key(live)
//! ```
//!
//! A stale token never reads stale data: invalidation deletes every
//! `{prefix}:{principal}:{tenant}:*` key, so the next lookup misses and
//! re-derives from the store at the live version.
//!
//! ## Graceful Degradation
//!
//! Backend failures and timeouts are logged and treated as misses. They
//! never surface to callers.

pub mod backend;
pub mod permissions;

pub use backend::{BackendStats, CacheBackend, CachedEntry};
pub use permissions::{CacheStats, CachedPermissions, EdgePermissionCache};

/// Internal cache-tier failure. Never escapes [`EdgePermissionCache`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No pooled connection was available.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// A Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A backend call exceeded its time bound.
    #[error("Cache operation timed out: {operation}")]
    Timeout {
        /// Backend operation name.
        operation: &'static str,
    },

    /// A cached value could not be encoded.
    #[error("Failed to encode cached permissions: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A cached value could not be decoded.
    #[error("Failed to decode cached permissions: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
