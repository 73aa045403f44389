//! Authorization state held behind the store's lock.
//!
//! [`PolicyState::apply`] validates a mutation completely before writing
//! anything, then writes and bumps versions. Because the caller holds the
//! write lock for the whole call, readers never observe a grant without its
//! version bump.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use uuid::Uuid;
use warden_authz::error::AuthzError;
use warden_authz::ledger::{INITIAL_AUTH_VERSION, next_version};
use warden_authz::policy::{EffectiveGrant, GrantSource};
use warden_authz::storage::{AffectedPrincipal, CommitReceipt, PolicyMutation, PrincipalGrants};
use warden_authz::types::{
    Group, GroupPermission, Permission, Principal, TenantId, UserGroup, UserPermission,
};
use warden_authz::AuthzResult;

/// Key of a direct grant: `(principal, permission, tenant)`.
type UserGrantKey = (Uuid, Uuid, TenantId);

/// Key of a membership: `(principal, group, tenant)`.
type MembershipKey = (Uuid, Uuid, TenantId);

/// Principals to bump, with the tenants whose cache partitions went stale.
type BumpTargets = BTreeMap<Uuid, BTreeSet<TenantId>>;

#[derive(Debug, Default)]
pub(crate) struct PolicyState {
    pub(crate) principals: HashMap<Uuid, Principal>,
    pub(crate) permissions: HashMap<Uuid, Permission>,
    permission_keys: HashMap<(String, String), Uuid>,
    pub(crate) groups: HashMap<Uuid, Group>,
    pub(crate) group_permissions: BTreeMap<(Uuid, Uuid), GroupPermission>,
    pub(crate) user_permissions: BTreeMap<UserGrantKey, UserPermission>,
    pub(crate) memberships: BTreeMap<MembershipKey, UserGroup>,
    pub(crate) versions: HashMap<Uuid, i64>,
}

impl PolicyState {
    // =========================================================================
    // Reads
    // =========================================================================

    pub(crate) fn version(&self, principal_id: Uuid) -> i64 {
        self.versions
            .get(&principal_id)
            .copied()
            .unwrap_or(INITIAL_AUTH_VERSION)
    }

    pub(crate) fn permission_by_key(&self, resource: &str, action: &str) -> Option<&Permission> {
        self.permission_keys
            .get(&(resource.to_string(), action.to_string()))
            .and_then(|id| self.permissions.get(id))
    }

    pub(crate) fn group_by_name(&self, name: &str, tenant: &TenantId) -> Option<&Group> {
        self.groups
            .values()
            .find(|g| g.name == name && &g.tenant == tenant)
    }

    /// Direct grants in `tenant` plus grants of the active groups the
    /// principal belongs to in `tenant`.
    pub(crate) fn load_grants(
        &self,
        principal_id: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<PrincipalGrants> {
        if !self.principals.contains_key(&principal_id) {
            return Err(AuthzError::not_found("principal", principal_id));
        }

        let direct = self
            .user_permissions
            .values()
            .filter(|g| g.principal_id == principal_id && &g.tenant == tenant)
            .filter_map(|g| {
                let permission = self.permissions.get(&g.permission_id)?;
                Some(EffectiveGrant::new(
                    GrantSource::Direct,
                    permission,
                    g.effect,
                    g.conditions.clone(),
                ))
            });

        let via_groups = self
            .memberships
            .values()
            .filter(|m| m.principal_id == principal_id && &m.tenant == tenant)
            .filter(|m| self.groups.get(&m.group_id).is_some_and(Group::is_active))
            .flat_map(move |m| self.grants_of_group(m.group_id))
            .filter_map(|g| {
                let permission = self.permissions.get(&g.permission_id)?;
                Some(EffectiveGrant::new(
                    GrantSource::Group(g.group_id),
                    permission,
                    g.effect,
                    g.conditions.clone(),
                ))
            });

        Ok(PrincipalGrants {
            version: self.version(principal_id),
            grants: direct.chain(via_groups).collect(),
        })
    }

    pub(crate) fn grants_of_group(&self, group_id: Uuid) -> impl Iterator<Item = &GroupPermission> {
        self.group_permissions
            .range((group_id, Uuid::nil())..=(group_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, grant)| grant)
    }

    pub(crate) fn members_of(&self, group_id: Uuid) -> impl Iterator<Item = &UserGroup> {
        self.memberships.values().filter(move |m| m.group_id == group_id)
    }

    fn member_targets(&self, group_id: Uuid) -> BumpTargets {
        let mut targets = BumpTargets::new();
        for membership in self.members_of(group_id) {
            targets
                .entry(membership.principal_id)
                .or_default()
                .insert(membership.tenant.clone());
        }
        targets
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Applies one mutation and the version bumps it implies.
    pub(crate) fn apply(&mut self, mutation: PolicyMutation) -> AuthzResult<CommitReceipt> {
        let targets = match mutation {
            PolicyMutation::RegisterPrincipal(principal) => {
                if self.principals.contains_key(&principal.id) {
                    return Err(AuthzError::validation(format!(
                        "principal {} already exists",
                        principal.id
                    )));
                }
                self.versions
                    .entry(principal.id)
                    .or_insert(INITIAL_AUTH_VERSION);
                self.principals.insert(principal.id, principal);
                BumpTargets::new()
            }

            PolicyMutation::CreatePermission(permission) => {
                let key = (permission.resource.clone(), permission.action.clone());
                if self.permission_keys.contains_key(&key) {
                    return Err(AuthzError::validation(format!(
                        "permission '{}' already exists",
                        permission.key()
                    )));
                }
                self.permission_keys.insert(key, permission.id);
                self.permissions.insert(permission.id, permission);
                BumpTargets::new()
            }

            PolicyMutation::CreateGroup(group) => {
                self.ensure_group_name_free(&group)?;
                self.groups.insert(group.id, group);
                BumpTargets::new()
            }

            PolicyMutation::UpdateGroup {
                group_id,
                update,
                protected,
            } => {
                let current = self.require_group(group_id)?;
                let group = update.apply(current, &protected)?;
                self.ensure_group_name_free(&group)?;
                let targets = if current.active != group.active {
                    self.member_targets(group_id)
                } else {
                    BumpTargets::new()
                };
                self.groups.insert(group_id, group.clone());
                let mut receipt = self.bump_targets(targets);
                receipt.group = Some(group);
                return Ok(receipt);
            }

            PolicyMutation::DeleteGroup { group_id } => {
                self.require_group(group_id)?;
                let targets = self.member_targets(group_id);
                self.groups.remove(&group_id);
                self.group_permissions.retain(|(g, _), _| *g != group_id);
                self.memberships.retain(|_, m| m.group_id != group_id);
                targets
            }

            PolicyMutation::AssignUserPermission(grant) => {
                self.require_principal(grant.principal_id)?;
                self.require_permission(grant.permission_id)?;
                let targets = single_target(grant.principal_id, grant.tenant.clone());
                let key = (grant.principal_id, grant.permission_id, grant.tenant.clone());
                self.user_permissions.insert(key, grant);
                targets
            }

            PolicyMutation::RevokeUserPermission {
                principal_id,
                permission_id,
                tenant,
            } => {
                let key = (principal_id, permission_id, tenant.clone());
                if self.user_permissions.remove(&key).is_none() {
                    return Err(AuthzError::not_found(
                        "user permission",
                        format!("{principal_id}/{permission_id}@{tenant}"),
                    ));
                }
                single_target(principal_id, tenant)
            }

            PolicyMutation::AddMembership(membership) => {
                self.require_principal(membership.principal_id)?;
                self.require_group(membership.group_id)?;
                let targets = single_target(membership.principal_id, membership.tenant.clone());
                let key = (
                    membership.principal_id,
                    membership.group_id,
                    membership.tenant.clone(),
                );
                self.memberships.entry(key).or_insert(membership);
                targets
            }

            PolicyMutation::RemoveMembership {
                principal_id,
                group_id,
                tenant,
            } => {
                let key = (principal_id, group_id, tenant.clone());
                if self.memberships.remove(&key).is_none() {
                    return Err(AuthzError::not_found(
                        "membership",
                        format!("{principal_id}/{group_id}@{tenant}"),
                    ));
                }
                single_target(principal_id, tenant)
            }

            PolicyMutation::AssignGroupPermission(grant) => {
                self.require_group(grant.group_id)?;
                self.require_permission(grant.permission_id)?;
                let targets = self.member_targets(grant.group_id);
                self.group_permissions
                    .insert((grant.group_id, grant.permission_id), grant);
                targets
            }

            PolicyMutation::RevokeGroupPermission {
                group_id,
                permission_id,
            } => {
                if self
                    .group_permissions
                    .remove(&(group_id, permission_id))
                    .is_none()
                {
                    return Err(AuthzError::not_found(
                        "group permission",
                        format!("{group_id}/{permission_id}"),
                    ));
                }
                self.member_targets(group_id)
            }
        };

        Ok(self.bump_targets(targets))
    }

    /// Increments each principal by one.
    pub(crate) fn bump(&mut self, principal_ids: &[Uuid]) -> Vec<(Uuid, i64)> {
        principal_ids
            .iter()
            .map(|id| {
                let version = next_version(self.versions.get(id).copied());
                self.versions.insert(*id, version);
                (*id, version)
            })
            .collect()
    }

    fn bump_targets(&mut self, targets: BumpTargets) -> CommitReceipt {
        let affected = targets
            .into_iter()
            .map(|(principal_id, tenants)| {
                let version = next_version(self.versions.get(&principal_id).copied());
                self.versions.insert(principal_id, version);
                AffectedPrincipal {
                    principal_id,
                    version,
                    tenants,
                }
            })
            .collect();
        CommitReceipt {
            affected,
            group: None,
        }
    }

    fn require_principal(&self, id: Uuid) -> AuthzResult<&Principal> {
        self.principals
            .get(&id)
            .ok_or_else(|| AuthzError::not_found("principal", id))
    }

    fn require_permission(&self, id: Uuid) -> AuthzResult<&Permission> {
        self.permissions
            .get(&id)
            .ok_or_else(|| AuthzError::not_found("permission", id))
    }

    fn require_group(&self, id: Uuid) -> AuthzResult<&Group> {
        self.groups
            .get(&id)
            .ok_or_else(|| AuthzError::not_found("group", id))
    }

    fn ensure_group_name_free(&self, group: &Group) -> AuthzResult<()> {
        match self.group_by_name(&group.name, &group.tenant) {
            Some(existing) if existing.id != group.id => Err(AuthzError::validation(format!(
                "group '{}' already exists in tenant '{}'",
                group.name, group.tenant
            ))),
            _ => Ok(()),
        }
    }
}

fn single_target(principal_id: Uuid, tenant: TenantId) -> BumpTargets {
    BumpTargets::from([(principal_id, BTreeSet::from([tenant]))])
}
