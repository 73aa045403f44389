//! Idempotent bootstrap of the built-in permission catalog and protected
//! groups.
//!
//! Running [`bootstrap`] twice leaves the store unchanged the second time:
//! existing permissions, groups, grants and memberships are detected and
//! skipped.

use uuid::Uuid;

use crate::AuthzResult;
use crate::storage::bounded;
use crate::types::{Effect, Group, NewGroup, Principal};

use super::service::GrantManager;

/// Resources the management surface itself is guarded by.
pub const BUILTIN_RESOURCES: &[&str] = &["group", "grant", "membership", "permission", "principal"];

/// Actions created for every built-in resource.
pub const BUILTIN_ACTIONS: &[&str] = &["read", "create", "update", "delete", "manage"];

/// Group that receives `manage` on every built-in resource.
pub const SUPER_ADMIN_GROUP: &str = "super_admin";

/// Optional admin principal to seed.
#[derive(Debug, Clone, Default)]
pub struct BootstrapPlan {
    /// Principal to register (if missing) and add to `super_admin`.
    pub admin: Option<AdminSeed>,
}

/// Identity of the seeded admin principal.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    /// Fixed principal id.
    pub id: Uuid,
    /// Display name used when the principal is created.
    pub display_name: String,
}

/// What a bootstrap run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Permissions created in this run.
    pub permissions_created: usize,
    /// Protected groups created in this run.
    pub groups_created: usize,
    /// Group grants created in this run.
    pub grants_created: usize,
    /// Seeded admin principal, if any.
    pub admin: Option<Uuid>,
}

/// Creates whatever part of the built-in state is missing.
///
/// # Errors
///
/// Returns the first store or validation error.
pub async fn bootstrap(
    grants: &GrantManager,
    plan: &BootstrapPlan,
) -> AuthzResult<BootstrapReport> {
    let mut report = BootstrapReport::default();
    let global = grants.global_tenant().clone();
    let store = grants.store();
    let limit = grants.operation_timeout();

    let mut manage_permissions = Vec::with_capacity(BUILTIN_RESOURCES.len());
    for resource in BUILTIN_RESOURCES {
        for action in BUILTIN_ACTIONS {
            let existing = bounded(
                limit,
                "find_permission_by_key",
                store.find_permission_by_key(resource, action),
            )
            .await?;
            let permission = match existing {
                Some(existing) => existing,
                None => {
                    report.permissions_created += 1;
                    grants
                        .create_permission(resource, action, Some(format!("{action} {resource}")))
                        .await?
                }
            };
            if *action == "manage" {
                manage_permissions.push(permission.id);
            }
        }
    }

    let mut super_admin: Option<Group> = None;
    let protected: Vec<String> = grants.protected_groups().names().map(str::to_string).collect();
    for name in protected {
        let existing = bounded(
            limit,
            "find_group_by_name",
            store.find_group_by_name(&name, &global),
        )
        .await?;
        let group = match existing {
            Some(existing) => existing,
            None => {
                report.groups_created += 1;
                grants
                    .create_group(NewGroup::new(name.clone(), global.clone()))
                    .await?
            }
        };
        if group.name == SUPER_ADMIN_GROUP {
            super_admin = Some(group);
        }
    }

    if let Some(group) = &super_admin {
        let existing =
            bounded(limit, "group_permissions", store.group_permissions(group.id)).await?;
        for permission_id in manage_permissions {
            if existing.iter().any(|g| g.permission_id == permission_id) {
                continue;
            }
            grants
                .assign_group_permission(group.id, permission_id, Effect::Allow, None)
                .await?;
            report.grants_created += 1;
        }
    }

    if let Some(seed) = &plan.admin {
        let existing = bounded(limit, "find_principal", store.find_principal(seed.id)).await?;
        let principal: Principal = match existing {
            Some(existing) => existing,
            None => {
                grants
                    .register_principal(Some(seed.id), &seed.display_name)
                    .await?
            }
        };

        if let Some(group) = &super_admin {
            let memberships =
                bounded(limit, "memberships", store.memberships(principal.id)).await?;
            let already_member = memberships
                .iter()
                .any(|m| m.group_id == group.id && m.tenant == global);
            if !already_member {
                grants
                    .add_group_member(principal.id, group.id, global.clone())
                    .await?;
            }
        }
        report.admin = Some(principal.id);
    }

    tracing::info!(
        permissions_created = report.permissions_created,
        groups_created = report.groups_created,
        grants_created = report.grants_created,
        admin = ?report.admin,
        "Authorization bootstrap complete"
    );
    Ok(report)
}
