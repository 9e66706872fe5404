//! Channel membership records and per-member role flags.

use std::collections::BTreeMap;

/// Per-member scheme role flags.
///
/// Exactly one of `{guest}`, `{user}`, `{user, admin}` is a legal
/// combination: guests can never hold another flag, and admin only rides on
/// top of user.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemberRoles {
    pub scheme_guest: bool,
    pub scheme_user: bool,
    pub scheme_admin: bool,
}

impl MemberRoles {
    /// A plain member.
    pub fn user() -> Self {
        Self {
            scheme_user: true,
            ..Self::default()
        }
    }

    /// A guest member.
    pub fn guest() -> Self {
        Self {
            scheme_guest: true,
            ..Self::default()
        }
    }

    /// A member with channel-admin rights.
    pub fn admin() -> Self {
        Self {
            scheme_user: true,
            scheme_admin: true,
            ..Self::default()
        }
    }

    /// Check the invariant: {guest}, {user} or {user, admin}.
    pub fn is_valid(&self) -> bool {
        match (self.scheme_guest, self.scheme_user, self.scheme_admin) {
            (true, false, false) => true,
            (false, true, _) => true,
            _ => false,
        }
    }
}

/// Per-channel notification preferences, stored as an open key/value map.
pub type NotifyProps = BTreeMap<String, String>;

/// Default notification preferences written at join time.
pub fn default_notify_props() -> NotifyProps {
    let mut props = NotifyProps::new();
    props.insert("desktop".to_string(), "default".to_string());
    props.insert("email".to_string(), "default".to_string());
    props.insert("push".to_string(), "default".to_string());
    props.insert("mark_unread".to_string(), "all".to_string());
    props.insert("ignore_channel_mentions".to_string(), "default".to_string());
    props
}

/// A user's membership of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMember {
    pub channel_id: String,
    pub user_id: String,
    pub roles: MemberRoles,
    pub notify_props: NotifyProps,
    /// Messages in the channel the member has seen.
    pub msg_count: i64,
    /// Unread mentions, root and reply posts alike.
    pub mention_count: i64,
    /// Unread mentions in root posts only. `None` on records written before
    /// the counter existed; backfilled lazily on first read.
    pub mention_count_root: Option<i64>,
    pub last_viewed_at: i64,
    pub last_update_at: i64,
}

impl ChannelMember {
    /// Fresh membership with the given flags and default notify props.
    pub fn new(channel_id: &str, user_id: &str, roles: MemberRoles, now: i64) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            roles,
            notify_props: default_notify_props(),
            msg_count: 0,
            mention_count: 0,
            mention_count_root: Some(0),
            last_viewed_at: now,
            last_update_at: now,
        }
    }
}

/// Unread counters returned to the read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUnread {
    pub channel_id: String,
    pub user_id: String,
    pub msg_count: i64,
    pub mention_count: i64,
    pub mention_count_root: i64,
}
