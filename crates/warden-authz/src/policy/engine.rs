//! Policy resolution engine.
//!
//! Computes effective permissions for a principal in a tenant and evaluates
//! single `(resource, action, context)` requests against them.
//!
//! # Example
//!
//! ```ignore
//! use warden_authz::policy::{PolicyResolver, RequestContext};
//!
//! let resolver = PolicyResolver::new(store, hierarchy, &config.store);
//!
//! let context = RequestContext::new().with("isSelf", true);
//! if resolver
//!     .has_permission(principal, "profile", "update", &tenant, Some(&context))
//!     .await?
//! {
//!     // Proceed with request
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::AuthzResult;
use crate::config::StoreConfig;
use crate::error::AuthzError;
use crate::storage::{PolicyStore, PrincipalGrants, bounded};
use crate::types::{Effect, TenantId};

use super::condition::conditions_hold;
use super::context::RequestContext;
use super::grant::EffectiveGrant;
use super::hierarchy::ActionHierarchy;
use super::snapshot::PermissionSnapshot;

// =============================================================================
// Access Decision
// =============================================================================

/// Result of evaluating one request against a set of grants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum AccessDecision {
    /// Access is granted by the named grant.
    Allow {
        /// First satisfied ALLOW grant encountered.
        grant: EffectiveGrant,
    },
    /// Access is denied.
    Deny {
        /// Why access was denied.
        reason: DenyReason,
    },
}

impl AccessDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Returns `true` if access was denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    /// Get the deny reason if access was denied.
    #[must_use]
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Deny { reason } => Some(reason),
            Self::Allow { .. } => None,
        }
    }
}

/// Reason for access denial.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum DenyReason {
    /// A matching DENY grant with satisfied conditions.
    DeniedBy {
        /// The DENY grant.
        grant: EffectiveGrant,
    },
    /// No matching grant had satisfied conditions.
    NoMatchingGrant,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluates a request against resolved grants.
///
/// A grant matches when its resource equals `resource` and its action covers
/// `action` (exact, universal, or compound expansion). Among matching grants
/// whose conditions hold, any DENY wins; otherwise any ALLOW grants access;
/// otherwise access is denied. The outcome does not depend on grant order.
#[must_use]
pub fn decide(
    grants: &[EffectiveGrant],
    hierarchy: &ActionHierarchy,
    resource: &str,
    action: &str,
    context: Option<&RequestContext>,
) -> AccessDecision {
    let mut allowed_by: Option<&EffectiveGrant> = None;

    let satisfied = grants
        .iter()
        .filter(|g| g.resource == resource && hierarchy.covers(&g.action, action))
        .filter(|g| conditions_hold(&g.conditions, context));

    for grant in satisfied {
        match grant.effect {
            Effect::Deny => {
                return AccessDecision::Deny {
                    reason: DenyReason::DeniedBy {
                        grant: grant.clone(),
                    },
                };
            }
            Effect::Allow => {
                allowed_by.get_or_insert(grant);
            }
        }
    }

    match allowed_by {
        Some(grant) => AccessDecision::Allow {
            grant: grant.clone(),
        },
        None => AccessDecision::Deny {
            reason: DenyReason::NoMatchingGrant,
        },
    }
}

/// Boolean form of [`decide`].
#[must_use]
pub fn evaluate(
    grants: &[EffectiveGrant],
    hierarchy: &ActionHierarchy,
    resource: &str,
    action: &str,
    context: Option<&RequestContext>,
) -> bool {
    decide(grants, hierarchy, resource, action, context).is_allowed()
}

/// Attaches the interrupted request to an unexpected failure. `NotFound` is
/// passed through unchanged.
pub(crate) fn wrap_evaluation(
    error: AuthzError,
    principal: Uuid,
    resource: &str,
    action: &str,
) -> AuthzError {
    match error {
        AuthzError::NotFound { .. } | AuthzError::Evaluation { .. } => error,
        other => AuthzError::evaluation(principal, resource, action, other),
    }
}

// =============================================================================
// Policy Resolver
// =============================================================================

/// Resolves grants from the policy store and evaluates requests.
pub struct PolicyResolver {
    store: Arc<dyn PolicyStore>,
    hierarchy: Arc<ActionHierarchy>,
    timeout: Duration,
}

impl PolicyResolver {
    /// Creates a resolver over a policy store.
    #[must_use]
    pub fn new(
        store: Arc<dyn PolicyStore>,
        hierarchy: Arc<ActionHierarchy>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            store,
            hierarchy,
            timeout: config.operation_timeout,
        }
    }

    /// The action hierarchy used for matching.
    #[must_use]
    pub fn hierarchy(&self) -> &ActionHierarchy {
        &self.hierarchy
    }

    /// Loads the principal's current auth version and effective grants.
    ///
    /// Both are read in one store call so the grants correspond to the
    /// returned version.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown principal, or a storage/timeout
    /// error.
    pub async fn resolve(
        &self,
        principal: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<PrincipalGrants> {
        bounded(
            self.timeout,
            "load_grants",
            self.store.load_grants(principal, tenant),
        )
        .await
    }

    /// Evaluates a request and explains the outcome.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown principal; any other failure is
    /// wrapped in `Evaluation` with the request it interrupted.
    pub async fn decide(
        &self,
        principal: Uuid,
        resource: &str,
        action: &str,
        tenant: &TenantId,
        context: Option<&RequestContext>,
    ) -> AuthzResult<AccessDecision> {
        let resolved = self
            .resolve(principal, tenant)
            .await
            .map_err(|e| wrap_evaluation(e, principal, resource, action))?;

        let decision = decide(&resolved.grants, &self.hierarchy, resource, action, context);
        tracing::debug!(
            principal = %principal,
            tenant = %tenant,
            resource,
            action,
            version = resolved.version,
            allowed = decision.is_allowed(),
            "Permission evaluated"
        );
        Ok(decision)
    }

    /// Returns `true` if the principal may perform `action` on `resource`.
    ///
    /// # Errors
    ///
    /// See [`PolicyResolver::decide`].
    pub async fn has_permission(
        &self,
        principal: Uuid,
        resource: &str,
        action: &str,
        tenant: &TenantId,
        context: Option<&RequestContext>,
    ) -> AuthzResult<bool> {
        Ok(self
            .decide(principal, resource, action, tenant, context)
            .await?
            .is_allowed())
    }

    /// Computes the literal permission snapshot at the current auth version.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown principal, or a storage/timeout
    /// error.
    pub async fn snapshot(
        &self,
        principal: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<PermissionSnapshot> {
        let resolved = self.resolve(principal, tenant).await?;
        Ok(resolved.snapshot(&self.hierarchy))
    }
}
