//! Effective grants: grant rows joined with their permission.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Effect, Permission};

use super::condition::Condition;

/// Where an effective grant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GrantSource {
    /// A direct `UserPermission` row.
    Direct,
    /// A `GroupPermission` row reached through membership of this group.
    Group(Uuid),
}

/// A grant resolved for one principal in one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveGrant {
    /// Origin of the grant.
    pub source: GrantSource,
    /// Referenced permission.
    pub permission_id: Uuid,
    /// Permission resource.
    pub resource: String,
    /// Permission action.
    pub action: String,
    /// ALLOW or DENY.
    pub effect: Effect,
    /// Conditions that must all hold.
    pub conditions: Vec<Condition>,
}

impl EffectiveGrant {
    /// Joins a grant row's effect and conditions with its permission.
    #[must_use]
    pub fn new(
        source: GrantSource,
        permission: &Permission,
        effect: Effect,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            source,
            permission_id: permission.id,
            resource: permission.resource.clone(),
            action: permission.action.clone(),
            effect,
            conditions,
        }
    }

    /// Returns `true` if the grant carries no conditions.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }
}
