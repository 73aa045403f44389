//! Grant and membership rows.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::policy::condition::Condition;

use super::TenantId;

/// Outcome a grant produces when it matches a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Grants access.
    Allow,
    /// Refuses access; takes precedence over any matching ALLOW.
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Deny => write!(f, "DENY"),
        }
    }
}

/// A direct grant or denial for a principal in a tenant, bypassing groups.
///
/// `(principal_id, permission_id, tenant)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermission {
    /// Principal receiving the grant.
    pub principal_id: Uuid,
    /// Granted permission.
    pub permission_id: Uuid,
    /// Tenant the grant applies in.
    pub tenant: TenantId,
    /// ALLOW or DENY.
    pub effect: Effect,
    /// Conditions that must all hold; empty means unconditional.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// When the grant was written.
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,
}

/// A grant attached to a group.
///
/// `(group_id, permission_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPermission {
    /// Group receiving the grant.
    pub group_id: Uuid,
    /// Granted permission.
    pub permission_id: Uuid,
    /// ALLOW or DENY.
    pub effect: Effect,
    /// Conditions that must all hold; empty means unconditional.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// When the grant was written.
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,
}

/// Membership of a principal in a group, scoped to a tenant.
///
/// `(principal_id, group_id, tenant)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    /// Member principal.
    pub principal_id: Uuid,
    /// Group joined.
    pub group_id: Uuid,
    /// Tenant the membership applies in.
    pub tenant: TenantId,
    /// When the membership was created.
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

impl UserGroup {
    /// Creates a membership row stamped now.
    #[must_use]
    pub fn new(principal_id: Uuid, group_id: Uuid, tenant: TenantId) -> Self {
        Self {
            principal_id,
            group_id,
            tenant,
            added_at: OffsetDateTime::now_utc(),
        }
    }
}
