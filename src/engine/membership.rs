//! Membership consistency enforcement.
//!
//! Every mutation revalidates the role-flag invariant and, on
//! group-constrained channels, the admission/removal rules. The unread read
//! path carries the lazy `mention_count_root` backfill: derive, return, and
//! write back best-effort.

use super::{Actor, ChannelEngine};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Channel, ChannelMember, ChannelType, ChannelUnread, MemberRoles, NotifyProps, UserProfile,
    now_millis, permissions,
};
use crate::telemetry::OperationTimer;
use tracing::{info, warn};

impl ChannelEngine {
    /// Add a user to a channel, or return the existing membership
    /// unchanged. Self-joins on Open channels need no permission; anything
    /// else needs the privacy-matched manage-members permission.
    pub async fn add_member(
        &self,
        actor: &Actor,
        channel_id: &str,
        user_id: &str,
    ) -> EngineResult<ChannelMember> {
        let _timer = OperationTimer::new("add_member");
        let _guard = self.lock_channel(channel_id).await;

        let channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "add_member",
                channel_type: channel.channel_type,
            });
        }
        if channel.is_archived() {
            return Err(EngineError::ChannelArchived(channel.id));
        }
        let user = self.require_user(user_id).await?;

        if let Some(existing) = self.store().get_member(&channel.id, user_id).await? {
            return Ok(existing);
        }

        // Constraint state is checked under the channel guard, so two
        // concurrent adds cannot both pass on stale links.
        if channel.group_constrained && !user.is_bot {
            self.check_group_admission(&channel, &user).await?;
        }

        let self_join = actor.user_id == user_id && channel.channel_type == ChannelType::Open;
        if !self_join {
            let needed = manage_members_permission(&channel);
            self.require_channel_permission(actor, &channel, needed).await?;
        }

        let now = now_millis();
        let roles = if user.is_guest {
            MemberRoles::guest()
        } else {
            MemberRoles::user()
        };
        let member = ChannelMember::new(&channel.id, &user.id, roles, now);
        self.store().save_member(&member).await?;

        info!(channel = %channel.id, user = %user.id, "Member added");
        self.notify_member_added(&channel.id, &user.id, now);
        Ok(member)
    }

    /// Remove a member. On group-constrained channels only self-removal and
    /// bot-removal are allowed, for any actor.
    pub async fn remove_member(
        &self,
        actor: &Actor,
        channel_id: &str,
        user_id: &str,
    ) -> EngineResult<()> {
        let _timer = OperationTimer::new("remove_member");
        let _guard = self.lock_channel(channel_id).await;

        let channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "remove_member",
                channel_type: channel.channel_type,
            });
        }
        self.require_member(&channel.id, user_id).await?;

        let self_removal = actor.user_id == user_id;
        if channel.group_constrained && !self_removal {
            let user = self.require_user(user_id).await?;
            if !user.is_bot {
                crate::metrics::record_group_constraint_denial();
                return Err(EngineError::GroupConstrainedRemoval(user_id.to_string()));
            }
        }

        if !self_removal {
            let needed = manage_members_permission(&channel);
            self.require_channel_permission(actor, &channel, needed).await?;
        }

        let removed = self.store().delete_member(&channel.id, user_id).await?;
        if !removed {
            return Err(EngineError::MemberNotFound {
                channel_id: channel.id,
                user_id: user_id.to_string(),
            });
        }

        let now = now_millis();
        info!(channel = %channel.id, user = %user_id, "Member removed");
        self.notify_member_removed(&channel.id, user_id, now);
        Ok(())
    }

    /// Replace a member's scheme role flags. The combination must be one of
    /// {guest}, {user}, {user, admin}.
    pub async fn update_member_roles(
        &self,
        actor: &Actor,
        channel_id: &str,
        user_id: &str,
        roles: MemberRoles,
    ) -> EngineResult<ChannelMember> {
        let _timer = OperationTimer::new("update_member_roles");
        if !roles.is_valid() {
            return Err(EngineError::InvalidRoleFlags {
                guest: roles.scheme_guest,
                user: roles.scheme_user,
                admin: roles.scheme_admin,
            });
        }
        let _guard = self.lock_channel(channel_id).await;

        let channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "update_member_roles",
                channel_type: channel.channel_type,
            });
        }
        self.require_channel_permission(actor, &channel, permissions::MANAGE_CHANNEL_ROLES)
            .await?;

        let mut member = self.require_member(&channel.id, user_id).await?;
        let now = now_millis();
        member.roles = roles;
        member.last_update_at = now;
        self.store().save_member(&member).await?;

        info!(
            channel = %channel.id,
            user = %user_id,
            guest = roles.scheme_guest,
            user_flag = roles.scheme_user,
            admin = roles.scheme_admin,
            "Member roles updated"
        );
        if let Some(observer) = self.observer() {
            observer.member_roles_changed(&channel.id, user_id, now);
        }
        Ok(member)
    }

    /// Merge notification preferences into a membership. Members edit their
    /// own; anyone else needs the privileged path.
    pub async fn update_member_notify_props(
        &self,
        actor: &Actor,
        channel_id: &str,
        user_id: &str,
        props: NotifyProps,
    ) -> EngineResult<ChannelMember> {
        if actor.user_id != user_id && !actor.privileged() {
            return Err(EngineError::PermissionDenied(permissions::EDIT_OTHER_USERS));
        }
        let _guard = self.lock_channel(channel_id).await;

        let mut member = self.require_member(channel_id, user_id).await?;
        for (key, value) in props {
            member.notify_props.insert(key, value);
        }
        member.last_update_at = now_millis();
        self.store().save_member(&member).await?;
        Ok(member)
    }

    /// Channel members belonging to none of the given groups - the set an
    /// administrator previews before tightening a group constraint.
    pub async fn members_minus_group_members(
        &self,
        actor: &Actor,
        channel_id: &str,
        group_ids: &[String],
        page: u64,
        per_page: u64,
    ) -> EngineResult<(Vec<UserProfile>, i64)> {
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        let channel = self.require_channel(channel_id).await?;
        let result = self
            .store()
            .members_minus_group_members(&channel.id, group_ids, page, per_page)
            .await?;
        Ok(result)
    }

    /// Unread counters for a member. Older records miss the root-only
    /// mention counter; the first read derives it from mention history and
    /// persists the correction best-effort.
    pub async fn channel_unread(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> EngineResult<ChannelUnread> {
        let member = self.require_member(channel_id, user_id).await?;

        let root_count = match member.mention_count_root {
            Some(count) => count,
            None => {
                let derived = self.store().count_root_mentions(channel_id, user_id).await?;
                let backfilled = backfill_root_mentions(member.clone(), derived);
                crate::metrics::record_unread_backfill();
                // The read must succeed even when the write-back does not.
                if let Err(e) = self.store().save_member(&backfilled).await {
                    warn!(
                        channel = %channel_id,
                        user = %user_id,
                        error = %e,
                        "Failed to persist backfilled root mention count"
                    );
                }
                derived
            }
        };

        Ok(ChannelUnread {
            channel_id: member.channel_id,
            user_id: member.user_id,
            msg_count: member.msg_count,
            mention_count: member.mention_count,
            mention_count_root: root_count,
        })
    }

    /// Admission rule for group-constrained channels: the user must belong
    /// to at least one group actively linked to the channel.
    async fn check_group_admission(
        &self,
        channel: &Channel,
        user: &UserProfile,
    ) -> EngineResult<()> {
        let syncables = self.store().group_syncables_for_channel(&channel.id).await?;
        let group_ids: Vec<String> = syncables.into_iter().map(|s| s.group_id).collect();
        if self.store().is_user_in_any_group(&user.id, &group_ids).await? {
            Ok(())
        } else {
            crate::metrics::record_group_constraint_denial();
            Err(EngineError::GroupConstraintDenied(user.id.clone()))
        }
    }
}

/// Which manage-members permission applies to this channel.
fn manage_members_permission(channel: &Channel) -> &'static str {
    match channel.channel_type {
        ChannelType::Private => permissions::MANAGE_PRIVATE_CHANNEL_MEMBERS,
        _ => permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS,
    }
}

/// Pure backfill step: stamp the derived root-only mention count onto the
/// member record.
fn backfill_root_mentions(mut member: ChannelMember, root_count: i64) -> ChannelMember {
    member.mention_count_root = Some(root_count);
    member
}
