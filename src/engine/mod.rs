//! The channel engine.
//!
//! [`ChannelEngine`] wires the persistence adapter, the team-membership
//! collaborator, an optional change observer, and the capability
//! configuration together, and exposes the operations the transport layer
//! calls. Implementation is split by concern:
//! - [`scheme`]: effective-role resolution over the scope chain
//! - [`moderation`]: per-channel permission moderation
//! - [`lifecycle`]: creation, privacy, archival, moves
//! - [`membership`]: member admission/removal and unread accounting
//!
//! Every operation is a bounded computation over a handful of store calls.
//! Mutations on the same channel are serialized through a per-channel lock;
//! different channels never contend.

mod lifecycle;
mod membership;
mod moderation;
mod observer;
mod scheme;

pub use lifecycle::ChannelCreate;
pub use observer::EngineObserver;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{Channel, ChannelMember, Role, RoleTriple, Team, UserProfile};
use crate::store::{ChannelStore, TeamMembership};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The acting principal for an engine operation, resolved by the caller's
/// auth/session layer.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    /// System administrators bypass channel-level permission resolution.
    pub system_admin: bool,
    /// Local (administrative transport) actors bypass permission resolution
    /// and capability flags, like the original's local mode.
    pub local: bool,
}

impl Actor {
    /// A regular user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            system_admin: false,
            local: false,
        }
    }

    /// A system administrator.
    pub fn system_admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            system_admin: true,
            local: false,
        }
    }

    /// The local administrative transport (no session user).
    pub fn local() -> Self {
        Self {
            user_id: String::new(),
            system_admin: false,
            local: true,
        }
    }

    /// Whether the actor may take privileged (administrative) paths.
    pub fn privileged(&self) -> bool {
        self.system_admin || self.local
    }
}

/// Channel access-control and membership-consistency engine.
pub struct ChannelEngine {
    store: Arc<dyn ChannelStore>,
    teams: Arc<dyn TeamMembership>,
    observer: Option<Arc<dyn EngineObserver>>,
    config: EngineConfig,
    /// Per-channel mutation guards. Entries are created on first use and
    /// kept for the channel's lifetime; contention is per channel only.
    channel_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChannelEngine {
    /// Create an engine over the given collaborators.
    pub fn new(
        store: Arc<dyn ChannelStore>,
        teams: Arc<dyn TeamMembership>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            teams,
            observer: None,
            config,
            channel_locks: DashMap::new(),
        }
    }

    /// Register a change observer. Notifications fire after commit and can
    /// never fail the underlying mutation.
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn ChannelStore {
        self.store.as_ref()
    }

    pub(crate) fn teams(&self) -> &dyn TeamMembership {
        self.teams.as_ref()
    }

    pub(crate) fn observer(&self) -> Option<&Arc<dyn EngineObserver>> {
        self.observer.as_ref()
    }

    /// Take the channel's mutation guard. Mutating operations re-read the
    /// channel after acquiring it so they never act on a stale snapshot.
    pub(crate) async fn lock_channel(&self, channel_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .channel_locks
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    // ------------------------------------------------------------------
    // Shared lookups
    // ------------------------------------------------------------------

    pub(crate) async fn require_channel(&self, channel_id: &str) -> EngineResult<Channel> {
        if !crate::model::is_valid_id(channel_id) {
            return Err(EngineError::InvalidId(channel_id.to_string()));
        }
        self.store
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| EngineError::ChannelNotFound(channel_id.to_string()))
    }

    pub(crate) async fn require_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> EngineResult<ChannelMember> {
        self.store
            .get_member(channel_id, user_id)
            .await?
            .ok_or_else(|| EngineError::MemberNotFound {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
            })
    }

    pub(crate) async fn require_user(&self, user_id: &str) -> EngineResult<UserProfile> {
        if !crate::model::is_valid_id(user_id) {
            return Err(EngineError::InvalidId(user_id.to_string()));
        }
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
    }

    pub(crate) fn notify_member_added(&self, channel_id: &str, user_id: &str, at: i64) {
        crate::metrics::record_member_added();
        if let Some(observer) = self.observer() {
            observer.member_added(channel_id, user_id, at);
        }
    }

    pub(crate) fn notify_member_removed(&self, channel_id: &str, user_id: &str, at: i64) {
        crate::metrics::record_member_removed();
        if let Some(observer) = self.observer() {
            observer.member_removed(channel_id, user_id, at);
        }
    }

    /// The owning team, if the channel has one. A dangling team reference is
    /// a data-integrity fault.
    pub(crate) async fn team_for(&self, channel: &Channel) -> EngineResult<Option<Team>> {
        match &channel.team_id {
            None => Ok(None),
            Some(team_id) => {
                let team = self.store.get_team(team_id).await?.ok_or_else(|| {
                    EngineError::Integrity(format!(
                        "channel {} references missing team {}",
                        channel.id, team_id
                    ))
                })?;
                Ok(Some(team))
            }
        }
    }

    /// Load a role the scope chain resolved to. A missing role here means
    /// the chain itself is inconsistent, so the operation fails closed.
    pub(crate) async fn role_by_name(&self, name: &str) -> EngineResult<Role> {
        self.store
            .get_role_by_name(name)
            .await?
            .ok_or_else(|| EngineError::Integrity(format!("resolved role {name:?} does not exist")))
    }

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------

    /// Whether the actor holds `permission` inside the channel, resolving
    /// the acting member's effective roles through the scheme chain.
    /// Privileged actors always pass; non-members never do.
    pub(crate) async fn has_channel_permission(
        &self,
        actor: &Actor,
        channel: &Channel,
        permission: &str,
    ) -> EngineResult<bool> {
        if actor.privileged() {
            return Ok(true);
        }
        let Some(member) = self.store.get_member(&channel.id, &actor.user_id).await? else {
            return Ok(false);
        };

        let team = self.team_for(channel).await?;
        let triple = self.resolved_roles(channel, team.as_ref()).await?;
        for role_name in member_role_names(&member, &triple) {
            let role = self.role_by_name(&role_name).await?;
            if role.has_permission(permission) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) async fn require_channel_permission(
        &self,
        actor: &Actor,
        channel: &Channel,
        permission: &'static str,
    ) -> EngineResult<()> {
        if self.has_channel_permission(actor, channel, permission).await? {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(permission))
        }
    }

    /// Gate for operations that are administrative regardless of channel
    /// roles (moderation management, restores, moves, scheme assignment).
    pub(crate) fn require_privileged(
        &self,
        actor: &Actor,
        permission: &'static str,
    ) -> EngineResult<()> {
        if actor.privileged() {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(permission))
        }
    }
}

/// Role names a member's flags map to, in check order.
fn member_role_names(member: &ChannelMember, triple: &RoleTriple) -> Vec<String> {
    let mut names = Vec::with_capacity(2);
    if member.roles.scheme_guest
        && let Some(guest) = &triple.guest
    {
        names.push(guest.clone());
    }
    if member.roles.scheme_user {
        names.push(triple.user.clone());
    }
    if member.roles.scheme_admin {
        names.push(triple.admin.clone());
    }
    names
}
