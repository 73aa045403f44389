//! # warden-authz
//!
//! Multi-tenant authorization engine for Warden.
//!
//! This crate provides:
//! - Policy resolution over direct and group grants with ALLOW/DENY
//!   precedence, universal and compound actions, and contextual conditions
//! - A per-principal auth version ledger used to partition and invalidate
//!   cached permissions
//! - Grant management with atomic version bumps and cache invalidation
//! - An edge permission cache (local or Redis) keyed by the version carried
//!   in the access token
//! - An enforcement guard with axum integration
//!
//! ## Overview
//!
//! Requests flow guard → edge cache → (on miss) resolver → policy store.
//! Mutations flow grant manager → policy store (write + version bump in one
//! unit) → cache invalidation. A token stamped with an old version never
//! serves stale permissions: after a mutation the old key is gone and the
//! lookup falls through to live state.
//!
//! ## Modules
//!
//! - [`config`] - Engine configuration
//! - [`error`] - Error taxonomy
//! - [`types`] - Principals, permissions, groups and grant rows
//! - [`policy`] - Conditions, action hierarchy and the resolution engine
//! - [`ledger`] - Auth version ledger
//! - [`storage`] - Policy store trait and atomic mutation units
//! - [`grants`] - Grant management and bootstrap
//! - [`cache`] - Edge permission cache
//! - [`token`] - Access token claims
//! - [`guard`] - Enforcement guard and axum middleware

pub mod cache;
pub mod config;
pub mod error;
pub mod grants;
pub mod guard;
pub mod ledger;
pub mod policy;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(test)]
mod testing;

pub use cache::{CacheBackend, CacheStats, CachedPermissions, EdgePermissionCache};
pub use config::{AuthzConfig, CacheBackendKind, CacheConfig, StoreConfig, TokenConfig};
pub use error::{AuthzError, ErrorCategory};
pub use grants::{BootstrapPlan, BootstrapReport, GrantManager, bootstrap};
pub use guard::{
    Access, Authorized, AuthorizedPrincipal, EnforcementGuard, GuardLayer, OperationMeta,
    RequestFields,
};
pub use ledger::{AuthVersionLedger, INITIAL_AUTH_VERSION};
pub use policy::{
    AccessDecision, ActionHierarchy, Condition, ConditionOperator, DenyReason, EffectiveGrant,
    GrantSource, PermissionSnapshot, PolicyResolver, RequestContext,
};
pub use storage::{CommitReceipt, PolicyMutation, PolicyStore, PrincipalGrants};
pub use token::{AccessClaims, TokenCodec};
pub use types::{
    Effect, Group, GroupPermission, GroupUpdate, NewGroup, Permission, Principal, TenantId,
    UserGroup, UserPermission,
};

/// Type alias for authorization results.
pub type AuthzResult<T> = Result<T, AuthzError>;
