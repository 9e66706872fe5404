//! Channel type and privacy state machine.
//!
//! Open and Private convert into each other through an explicit privacy
//! operation; Direct and Group are terminal - no conversion, no archival,
//! no membership churn. Archival is the regular delete; physical removal
//! and restore exist only behind the privileged path.

use super::{Actor, ChannelEngine};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Channel, ChannelMember, ChannelType, MemberRoles, direct_channel_name, group_channel_name,
    is_valid_channel_name, is_valid_id, new_id, now_millis, permissions,
};
use crate::telemetry::OperationTimer;
use tracing::{info, warn};

/// Inputs for creating a team channel.
#[derive(Debug, Clone)]
pub struct ChannelCreate {
    pub team_id: String,
    pub name: String,
    pub display_name: String,
    pub channel_type: ChannelType,
}

impl ChannelEngine {
    /// Create an Open or Private channel on a team. The creator joins as
    /// member+admin.
    pub async fn create_channel(&self, actor: &Actor, input: ChannelCreate) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("create_channel");
        if input.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "create_channel",
                channel_type: input.channel_type,
            });
        }
        if !is_valid_channel_name(&input.name) {
            return Err(EngineError::InvalidChannelName(input.name));
        }
        if input.display_name.is_empty() || input.display_name.len() > 64 {
            return Err(EngineError::InvalidDisplayName);
        }
        if !is_valid_id(&input.team_id) {
            return Err(EngineError::InvalidId(input.team_id));
        }
        self.store()
            .get_team(&input.team_id)
            .await?
            .ok_or_else(|| EngineError::TeamNotFound(input.team_id.clone()))?;

        if self
            .store()
            .get_channel_by_name(Some(&input.team_id), &input.name)
            .await?
            .is_some()
        {
            return Err(EngineError::NameTaken(input.name));
        }

        let now = now_millis();
        let channel = Channel {
            id: new_id(),
            channel_type: input.channel_type,
            team_id: Some(input.team_id),
            name: input.name,
            display_name: input.display_name,
            creator_id: actor.user_id.clone(),
            scheme_id: None,
            group_constrained: false,
            create_at: now,
            update_at: now,
            delete_at: 0,
        };
        self.store().save_channel(&channel).await?;

        if !actor.user_id.is_empty() {
            let member = ChannelMember::new(&channel.id, &actor.user_id, MemberRoles::admin(), now);
            self.store().save_member(&member).await?;
            self.notify_member_added(&channel.id, &actor.user_id, now);
        }

        info!(channel = %channel.id, name = %channel.name, kind = %channel.channel_type, "Channel created");
        Ok(channel)
    }

    /// Get or create the direct channel between the actor and another user.
    /// Repeat calls for the same pair return the existing channel.
    pub async fn create_direct_channel(
        &self,
        actor: &Actor,
        other_user_id: &str,
    ) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("create_direct_channel");
        let me = self.require_user(&actor.user_id).await?;
        let other = self.require_user(other_user_id).await?;

        let name = direct_channel_name(&me.id, &other.id);
        if let Some(existing) = self.store().get_channel_by_name(None, &name).await? {
            return Ok(existing);
        }

        let now = now_millis();
        let channel = Channel {
            id: new_id(),
            channel_type: ChannelType::Direct,
            team_id: None,
            name,
            display_name: format!("{}, {}", me.username, other.username),
            creator_id: me.id.clone(),
            scheme_id: None,
            group_constrained: false,
            create_at: now,
            update_at: now,
            delete_at: 0,
        };
        self.store().save_channel(&channel).await?;

        // Membership is fixed here, for good: Direct channels reject every
        // later add or remove.
        for user in [&me, &other] {
            let roles = if user.is_guest {
                MemberRoles::guest()
            } else {
                MemberRoles::user()
            };
            let member = ChannelMember::new(&channel.id, &user.id, roles, now);
            self.store().save_member(&member).await?;
            if other.id == me.id {
                break;
            }
        }

        info!(channel = %channel.id, "Direct channel created");
        Ok(channel)
    }

    /// Get or create a group channel over a fixed member set including the
    /// actor.
    pub async fn create_group_channel(
        &self,
        actor: &Actor,
        user_ids: &[String],
    ) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("create_group_channel");
        let mut ids: Vec<String> = user_ids.to_vec();
        if !ids.contains(&actor.user_id) {
            ids.push(actor.user_id.clone());
        }
        ids.sort_unstable();
        ids.dedup();

        if ids.len() < 3 || ids.len() > self.config().group_channel_max_members {
            return Err(EngineError::InvalidMemberCount(ids.len()));
        }

        let mut users = Vec::with_capacity(ids.len());
        for user_id in &ids {
            users.push(self.require_user(user_id).await?);
        }

        let name = group_channel_name(&ids);
        if let Some(existing) = self.store().get_channel_by_name(None, &name).await? {
            return Ok(existing);
        }

        let now = now_millis();
        let display_name = users
            .iter()
            .map(|u| u.username.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let channel = Channel {
            id: new_id(),
            channel_type: ChannelType::Group,
            team_id: None,
            name,
            display_name,
            creator_id: actor.user_id.clone(),
            scheme_id: None,
            group_constrained: false,
            create_at: now,
            update_at: now,
            delete_at: 0,
        };
        self.store().save_channel(&channel).await?;

        for user in &users {
            let roles = if user.is_guest {
                MemberRoles::guest()
            } else {
                MemberRoles::user()
            };
            let member = ChannelMember::new(&channel.id, &user.id, roles, now);
            self.store().save_member(&member).await?;
        }

        info!(channel = %channel.id, members = ids.len(), "Group channel created");
        Ok(channel)
    }

    /// Convert a channel between Open and Private. Converting to the type it
    /// already has succeeds without touching anything.
    pub async fn update_channel_privacy(
        &self,
        actor: &Actor,
        channel_id: &str,
        target: ChannelType,
    ) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("update_channel_privacy");
        if target.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "update_channel_privacy",
                channel_type: target,
            });
        }
        let _guard = self.lock_channel(channel_id).await;

        let mut channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "update_channel_privacy",
                channel_type: channel.channel_type,
            });
        }
        if self.is_default_channel(&channel) && target == ChannelType::Private {
            return Err(EngineError::DefaultChannelProtected("update_channel_privacy"));
        }
        if channel.channel_type == target {
            return Ok(channel);
        }

        let needed = match target {
            ChannelType::Private => permissions::CONVERT_PUBLIC_CHANNEL_TO_PRIVATE,
            _ => permissions::CONVERT_PRIVATE_CHANNEL_TO_PUBLIC,
        };
        self.require_channel_permission(actor, &channel, needed).await?;

        let now = now_millis();
        channel.channel_type = target;
        channel.update_at = now;
        self.store().update_channel(&channel).await?;

        info!(channel = %channel.id, target = %target, "Channel privacy converted");
        if let Some(observer) = self.observer() {
            observer.channel_converted(&channel.id, now);
        }
        Ok(channel)
    }

    /// Archive a channel (the regular delete). Direct/Group channels reject
    /// this for every actor.
    pub async fn archive_channel(&self, actor: &Actor, channel_id: &str) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("archive_channel");
        let _guard = self.lock_channel(channel_id).await;

        let mut channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "archive_channel",
                channel_type: channel.channel_type,
            });
        }
        if channel.is_archived() {
            return Err(EngineError::ChannelArchived(channel.id));
        }
        if self.is_default_channel(&channel) {
            return Err(EngineError::DefaultChannelProtected("archive_channel"));
        }

        let needed = match channel.channel_type {
            ChannelType::Private => permissions::DELETE_PRIVATE_CHANNEL,
            _ => permissions::DELETE_PUBLIC_CHANNEL,
        };
        self.require_channel_permission(actor, &channel, needed).await?;

        let now = now_millis();
        channel.delete_at = now;
        channel.update_at = now;
        self.store().update_channel(&channel).await?;

        info!(channel = %channel.id, "Channel archived");
        if let Some(observer) = self.observer() {
            observer.channel_archived(&channel.id, now);
        }
        Ok(channel)
    }

    /// Restore an archived channel. Privileged path only.
    pub async fn restore_channel(&self, actor: &Actor, channel_id: &str) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("restore_channel");
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        let _guard = self.lock_channel(channel_id).await;

        let mut channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "restore_channel",
                channel_type: channel.channel_type,
            });
        }

        let now = now_millis();
        channel.delete_at = 0;
        channel.update_at = now;
        self.store().update_channel(&channel).await?;

        info!(channel = %channel.id, "Channel restored");
        if let Some(observer) = self.observer() {
            observer.channel_restored(&channel.id, now);
        }
        Ok(channel)
    }

    /// Physically remove a channel and its membership. Disabled by default:
    /// remote privileged actors need the capability flag, local actors may
    /// always use it.
    pub async fn permanent_delete_channel(
        &self,
        actor: &Actor,
        channel_id: &str,
    ) -> EngineResult<()> {
        let _timer = OperationTimer::new("permanent_delete_channel");
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        if !actor.local && !self.config().enable_permanent_delete {
            return Err(EngineError::FeatureDisabled("permanent_delete_channel"));
        }
        let _guard = self.lock_channel(channel_id).await;

        let channel = self.require_channel(channel_id).await?;
        self.store().delete_channel(&channel.id).await?;
        warn!(channel = %channel.id, name = %channel.name, "Channel permanently deleted");
        Ok(())
    }

    /// Move an Open/Private channel to another team. Without `force`, every
    /// current member must already belong to the destination team; with it,
    /// the move proceeds and membership is left alone.
    pub async fn move_channel(
        &self,
        actor: &Actor,
        channel_id: &str,
        dest_team_id: &str,
        force: bool,
    ) -> EngineResult<Channel> {
        let _timer = OperationTimer::new("move_channel");
        self.require_privileged(actor, permissions::MANAGE_SYSTEM)?;
        let _guard = self.lock_channel(channel_id).await;

        let mut channel = self.require_channel(channel_id).await?;
        if channel.channel_type.is_peer_to_peer() {
            return Err(EngineError::TypeInvalid {
                op: "move_channel",
                channel_type: channel.channel_type,
            });
        }
        let team = self
            .store()
            .get_team(dest_team_id)
            .await?
            .ok_or_else(|| EngineError::TeamNotFound(dest_team_id.to_string()))?;

        if let Some(existing) = self
            .store()
            .get_channel_by_name(Some(&team.id), &channel.name)
            .await?
            && existing.id != channel.id
        {
            return Err(EngineError::NameTaken(channel.name));
        }

        if !force {
            let members = self.store().list_members(&channel.id).await?;
            for member in &members {
                if !self.teams().is_team_member(&team.id, &member.user_id).await? {
                    return Err(EngineError::MembersNotInTeam(team.id));
                }
            }
        }

        let now = now_millis();
        channel.team_id = Some(team.id.clone());
        channel.update_at = now;
        self.store().update_channel(&channel).await?;

        info!(channel = %channel.id, team = %team.id, force = force, "Channel moved");
        if let Some(observer) = self.observer() {
            observer.channel_moved(&channel.id, &team.id, now);
        }
        Ok(channel)
    }

    fn is_default_channel(&self, channel: &Channel) -> bool {
        channel.team_id.is_some() && channel.name == self.config().default_channel_name
    }
}
