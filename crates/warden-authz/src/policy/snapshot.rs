//! Permission snapshots.
//!
//! A snapshot is the bulk-cacheable form of a principal's permissions: a
//! version plus a set of literal `"resource:action"` strings. It is built
//! with plain set algebra and is deliberately less precise than
//! [`super::engine::decide`]:
//!
//! - conditions are ignored (a conditional ALLOW is included, a conditional
//!   DENY still removes);
//! - universal actions are kept as their literal string (`staff:manage`)
//!   rather than matching every action.
//!
//! Checks that need condition or universal-action semantics must go through
//! `has_permission`, never through [`PermissionSnapshot::contains`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Effect, permission_key};

use super::grant::EffectiveGrant;
use super::hierarchy::ActionHierarchy;

/// Versioned set of literal permission strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    /// Auth version the snapshot was computed at.
    pub version: i64,
    /// Sorted `"resource:action"` strings.
    pub permissions: BTreeSet<String>,
}

impl PermissionSnapshot {
    /// Builds a snapshot from resolved grants.
    ///
    /// Every ALLOW grant contributes its literal key plus each implied action;
    /// every DENY grant then removes its literal key and implied actions.
    #[must_use]
    pub fn from_grants(
        version: i64,
        grants: &[EffectiveGrant],
        hierarchy: &ActionHierarchy,
    ) -> Self {
        let expand = |effect: Effect| -> BTreeSet<String> {
            grants
                .iter()
                .filter(|g| g.effect == effect)
                .flat_map(|g| {
                    hierarchy
                        .implied_actions(&g.action)
                        .map(move |action| permission_key(&g.resource, action))
                })
                .collect()
        };

        let allowed = expand(Effect::Allow);
        let denied = expand(Effect::Deny);

        Self {
            version,
            permissions: allowed.difference(&denied).cloned().collect(),
        }
    }

    /// Literal membership test. See the module docs for its limits.
    #[must_use]
    pub fn contains(&self, resource: &str, action: &str) -> bool {
        self.permissions.contains(&permission_key(resource, action))
    }

    /// Number of permission strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Returns `true` if the snapshot grants nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    /// Iterates over permission strings in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }
}
