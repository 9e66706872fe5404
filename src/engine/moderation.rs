//! Per-channel permission moderation.
//!
//! A channel with no scheme of its own reflects the higher scope (team
//! scheme or system defaults). The first patch that deviates from the
//! higher scope clones the higher-scoped roles into a fresh Channel-scope
//! scheme; a patch set that converges back retires that scheme again. All
//! of it runs under the channel's mutation guard, so concurrent patches see
//! committed state, never a half-clone.

use super::{Actor, ChannelEngine};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Channel, ChannelType, ModeratedGrant, ModeratedPermission, ModerationEntry, ModerationPatch,
    Role, RoleTriple, Scheme, SchemeScope, Team, new_id, now_millis, permissions,
};
use crate::telemetry::OperationTimer;
use tracing::info;

/// The guest/user/admin roles a scope resolves to, loaded from the store.
struct SchemeRoleSet {
    guest: Option<Role>,
    user: Role,
    admin: Role,
}

/// Grant state of one moderated permission for the two patchable classes.
/// `guests` is `None` when the guest dimension does not exist (either the
/// permission has none, or no guest role is resolvable in this scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GrantRow {
    permission: ModeratedPermission,
    guests: Option<bool>,
    members: bool,
}

type GrantMatrix = Vec<GrantRow>;

fn grant_matrix(roles: &SchemeRoleSet, channel_type: ChannelType) -> GrantMatrix {
    ModeratedPermission::ALL
        .iter()
        .map(|&permission| {
            let probe = permission.probe(channel_type);
            let guests = if permission.has_guest_dimension() {
                roles.guest.as_ref().map(|role| role.has_permission(probe))
            } else {
                None
            };
            GrantRow {
                permission,
                guests,
                members: roles.user.has_permission(probe),
            }
        })
        .collect()
}

/// Apply patches to a grant matrix. Patching a guest dimension that does
/// not exist is a validation failure.
fn apply_patches(matrix: &mut GrantMatrix, patches: &[ModerationPatch]) -> EngineResult<()> {
    for patch in patches {
        let row = matrix
            .iter_mut()
            .find(|row| row.permission == patch.permission)
            .ok_or_else(|| {
                EngineError::UnknownModeratedPermission(patch.permission.as_str().to_string())
            })?;
        if let Some(granted) = patch.roles.guests {
            if row.guests.is_none() {
                return Err(EngineError::ModerationNotEnabled(
                    patch.permission.as_str().to_string(),
                ));
            }
            row.guests = Some(granted);
        }
        if let Some(granted) = patch.roles.members {
            row.members = granted;
        }
    }
    Ok(())
}

/// A grant can never exceed what the higher scope offers.
fn check_against_higher(desired: &GrantMatrix, higher: &GrantMatrix) -> EngineResult<()> {
    for (row, ancestor) in desired.iter().zip(higher) {
        let members_overreach = row.members && !ancestor.members;
        let guests_overreach = row.guests == Some(true) && ancestor.guests != Some(true);
        if members_overreach || guests_overreach {
            return Err(EngineError::ModerationNotEnabled(
                row.permission.as_str().to_string(),
            ));
        }
    }
    Ok(())
}

/// Write a desired grant matrix into the channel-scheme guest/user roles by
/// toggling each moderated permission's underlying permissions.
fn apply_matrix_to_roles(roles: &mut SchemeRoleSet, desired: &GrantMatrix) {
    for row in desired {
        for &underlying in row.permission.underlying() {
            toggle(&mut roles.user.permissions, underlying, row.members);
            if let (Some(guest), Some(granted)) = (roles.guest.as_mut(), row.guests) {
                toggle(&mut guest.permissions, underlying, granted);
            }
        }
    }
}

fn toggle(permissions: &mut std::collections::BTreeSet<String>, permission: &str, granted: bool) {
    if granted {
        permissions.insert(permission.to_string());
    } else {
        permissions.remove(permission);
    }
}

fn build_entries(effective: &GrantMatrix, higher: &GrantMatrix) -> Vec<ModerationEntry> {
    effective
        .iter()
        .zip(higher)
        .map(|(row, ancestor)| {
            let guests = if row.permission.has_guest_dimension() {
                let enabled = ancestor.guests == Some(true);
                Some(ModeratedGrant {
                    value: enabled && row.guests == Some(true),
                    enabled,
                })
            } else {
                None
            };
            ModerationEntry {
                permission: row.permission,
                guests,
                members: ModeratedGrant {
                    value: ancestor.members && row.members,
                    enabled: ancestor.members,
                },
            }
        })
        .collect()
}

impl ChannelEngine {
    /// The moderation list for a channel: one entry per moderated
    /// permission, with current value and patchability per role class.
    pub async fn channel_moderations(
        &self,
        actor: &Actor,
        channel_id: &str,
    ) -> EngineResult<Vec<ModerationEntry>> {
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        let channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "channel_moderations",
                channel_type: channel.channel_type,
            });
        }
        let team = self.team_for(&channel).await?;
        self.compute_moderations(&channel, team.as_ref()).await
    }

    /// Apply moderation patches, materializing or retiring the channel
    /// scheme as needed, and return the updated moderation list.
    pub async fn patch_moderations(
        &self,
        actor: &Actor,
        channel_id: &str,
        patches: &[ModerationPatch],
    ) -> EngineResult<Vec<ModerationEntry>> {
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        let _timer = OperationTimer::new("patch_moderations");
        let _guard = self.lock_channel(channel_id).await;

        // Re-read under the guard: a concurrent patch may have cloned or
        // retired the scheme since the caller looked.
        let mut channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "patch_moderations",
                channel_type: channel.channel_type,
            });
        }
        let team = self.team_for(&channel).await?;

        let higher_triple = self.higher_scoped_roles(team.as_ref()).await?;
        let higher_roles = self.load_role_set(&higher_triple).await?;
        let higher = grant_matrix(&higher_roles, channel.channel_type);

        let effective_triple = self.resolved_roles(&channel, team.as_ref()).await?;
        let effective_roles = self.load_role_set(&effective_triple).await?;
        let mut desired = grant_matrix(&effective_roles, channel.channel_type);
        apply_patches(&mut desired, patches)?;
        check_against_higher(&desired, &higher)?;

        let now = now_millis();
        if desired == higher {
            self.retire_channel_scheme(&mut channel, now).await?;
        } else {
            match self.active_channel_scheme(&channel).await? {
                Some(scheme) => {
                    let triple = RoleTriple::from_scheme(&scheme);
                    let mut roles = self.load_role_set(&triple).await?;
                    apply_matrix_to_roles(&mut roles, &desired);
                    self.save_role_set(&roles).await?;
                }
                None => {
                    self.materialize_channel_scheme(&mut channel, &higher_roles, &desired, now)
                        .await?;
                }
            }
        }

        let team = self.team_for(&channel).await?;
        self.compute_moderations(&channel, team.as_ref()).await
    }

    async fn compute_moderations(
        &self,
        channel: &Channel,
        team: Option<&Team>,
    ) -> EngineResult<Vec<ModerationEntry>> {
        let effective_triple = self.resolved_roles(channel, team).await?;
        let higher_triple = self.higher_scoped_roles(team).await?;

        let effective_roles = self.load_role_set(&effective_triple).await?;
        let higher_roles = self.load_role_set(&higher_triple).await?;

        let effective = grant_matrix(&effective_roles, channel.channel_type);
        let higher = grant_matrix(&higher_roles, channel.channel_type);
        Ok(build_entries(&effective, &higher))
    }

    async fn load_role_set(&self, triple: &RoleTriple) -> EngineResult<SchemeRoleSet> {
        let guest = match &triple.guest {
            Some(name) => Some(self.role_by_name(name).await?),
            None => None,
        };
        let user = self.role_by_name(&triple.user).await?;
        let admin = self.role_by_name(&triple.admin).await?;
        Ok(SchemeRoleSet { guest, user, admin })
    }

    async fn save_role_set(&self, roles: &SchemeRoleSet) -> EngineResult<()> {
        if let Some(guest) = &roles.guest {
            self.store().save_role(guest).await?;
        }
        self.store().save_role(&roles.user).await?;
        Ok(())
    }

    /// The channel's own scheme, if one is assigned and not soft-deleted.
    async fn active_channel_scheme(&self, channel: &Channel) -> EngineResult<Option<Scheme>> {
        let Some(scheme_id) = &channel.scheme_id else {
            return Ok(None);
        };
        let scheme = self.store().get_scheme(scheme_id).await?.ok_or_else(|| {
            EngineError::Integrity(format!(
                "channel {} references missing scheme {scheme_id}",
                channel.id
            ))
        })?;
        if scheme.scope != SchemeScope::Channel {
            return Err(EngineError::Integrity(format!(
                "scheme {scheme_id} assigned to channel {} is not channel-scoped",
                channel.id
            )));
        }
        Ok((!scheme.is_deleted()).then_some(scheme))
    }

    /// Clone the higher-scoped roles into a fresh Channel-scope scheme and
    /// hang it on the channel.
    async fn materialize_channel_scheme(
        &self,
        channel: &mut Channel,
        higher_roles: &SchemeRoleSet,
        desired: &GrantMatrix,
        now: i64,
    ) -> EngineResult<()> {
        let mut cloned = SchemeRoleSet {
            guest: higher_roles.guest.as_ref().map(|role| clone_role(role, now)),
            user: clone_role(&higher_roles.user, now),
            admin: clone_role(&higher_roles.admin, now),
        };
        apply_matrix_to_roles(&mut cloned, desired);

        if let Some(guest) = &cloned.guest {
            self.store().save_role(guest).await?;
        }
        self.store().save_role(&cloned.user).await?;
        self.store().save_role(&cloned.admin).await?;

        let scheme = Scheme {
            id: new_id(),
            name: format!("moderation-{}", channel.id),
            scope: SchemeScope::Channel,
            default_channel_guest_role: cloned
                .guest
                .as_ref()
                .map(|role| role.name.clone())
                .unwrap_or_default(),
            default_channel_user_role: cloned.user.name.clone(),
            default_channel_admin_role: cloned.admin.name.clone(),
            create_at: now,
            delete_at: 0,
        };
        self.store().save_scheme(&scheme).await?;

        channel.scheme_id = Some(scheme.id.clone());
        channel.update_at = now;
        self.store().update_channel(channel).await?;

        crate::metrics::record_scheme_created();
        info!(channel = %channel.id, scheme = %scheme.id, "Channel scheme materialized");
        Ok(())
    }

    /// Soft-delete the channel's scheme and unhook it. Idempotent cleanup:
    /// calling it on a scheme-less channel is a no-op.
    async fn retire_channel_scheme(&self, channel: &mut Channel, now: i64) -> EngineResult<()> {
        let Some(scheme_id) = channel.scheme_id.take() else {
            return Ok(());
        };
        self.store().delete_scheme(&scheme_id, now).await?;
        channel.update_at = now;
        self.store().update_channel(channel).await?;

        crate::metrics::record_scheme_retired();
        info!(channel = %channel.id, scheme = %scheme_id, "Channel scheme retired");
        Ok(())
    }
}

fn clone_role(source: &Role, now: i64) -> Role {
    Role {
        id: new_id(),
        name: new_id(),
        permissions: source.permissions.clone(),
        built_in: false,
        create_at: now,
        delete_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RolePatchTarget;
    use std::collections::BTreeSet;

    fn role(name: &str, perms: &[&str]) -> Role {
        Role {
            id: format!("id_{name}"),
            name: name.to_string(),
            permissions: perms.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
            built_in: true,
            create_at: 0,
            delete_at: 0,
        }
    }

    fn full_set() -> SchemeRoleSet {
        let everything = [
            permissions::CREATE_POST,
            permissions::ADD_REACTION,
            permissions::REMOVE_REACTION,
            permissions::USE_CHANNEL_MENTIONS,
            permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS,
            permissions::MANAGE_PRIVATE_CHANNEL_MEMBERS,
        ];
        SchemeRoleSet {
            guest: Some(role("g", &everything[..4])),
            user: role("u", &everything),
            admin: role("a", &everything),
        }
    }

    #[test]
    fn default_matrix_grants_everything() {
        let matrix = grant_matrix(&full_set(), ChannelType::Open);
        assert_eq!(matrix.len(), 4);
        for row in &matrix {
            assert!(row.members);
            if row.permission.has_guest_dimension() {
                assert_eq!(row.guests, Some(true));
            } else {
                assert_eq!(row.guests, None);
            }
        }
    }

    #[test]
    fn manage_members_row_tracks_privacy() {
        let mut roles = full_set();
        roles
            .user
            .permissions
            .remove(permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS);

        let open = grant_matrix(&roles, ChannelType::Open);
        let private = grant_matrix(&roles, ChannelType::Private);
        let row = |m: &GrantMatrix| {
            m.iter()
                .find(|r| r.permission == ModeratedPermission::ManageMembers)
                .copied()
                .unwrap()
        };
        assert!(!row(&open).members);
        assert!(row(&private).members);
    }

    #[test]
    fn patching_missing_guest_dimension_fails() {
        let mut matrix = grant_matrix(&full_set(), ChannelType::Open);
        let patch = ModerationPatch {
            permission: ModeratedPermission::ManageMembers,
            roles: RolePatchTarget {
                guests: Some(false),
                members: None,
            },
        };
        let err = apply_patches(&mut matrix, std::slice::from_ref(&patch)).unwrap_err();
        assert!(matches!(err, EngineError::ModerationNotEnabled(_)));
    }

    #[test]
    fn overreaching_grant_is_rejected() {
        let roles = full_set();
        let higher = {
            let mut restricted = full_set();
            restricted.user.permissions.remove(permissions::CREATE_POST);
            grant_matrix(&restricted, ChannelType::Open)
        };
        let desired = grant_matrix(&roles, ChannelType::Open);
        let err = check_against_higher(&desired, &higher).unwrap_err();
        assert!(matches!(err, EngineError::ModerationNotEnabled(_)));
    }

    #[test]
    fn matrix_round_trips_through_roles() {
        let mut roles = full_set();
        let mut desired = grant_matrix(&roles, ChannelType::Open);
        desired
            .iter_mut()
            .find(|r| r.permission == ModeratedPermission::CreateReactions)
            .unwrap()
            .members = false;

        apply_matrix_to_roles(&mut roles, &desired);
        assert!(!roles.user.has_permission(permissions::ADD_REACTION));
        assert!(!roles.user.has_permission(permissions::REMOVE_REACTION));
        assert_eq!(grant_matrix(&roles, ChannelType::Open), desired);
    }

    #[test]
    fn entries_force_value_false_when_disabled() {
        let effective = grant_matrix(&full_set(), ChannelType::Open);
        let higher = {
            let mut restricted = full_set();
            restricted.guest.as_mut().unwrap().permissions.clear();
            grant_matrix(&restricted, ChannelType::Open)
        };
        let entries = build_entries(&effective, &higher);
        let create_post = entries
            .iter()
            .find(|e| e.permission == ModeratedPermission::CreatePost)
            .unwrap();
        let guests = create_post.guests.unwrap();
        assert!(!guests.enabled);
        assert!(!guests.value);
        assert!(create_post.members.value);
    }
}
