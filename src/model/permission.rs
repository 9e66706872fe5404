//! Permission identifiers and the moderated-permission table.
//!
//! Moderated permissions are a closed set; each maps to the underlying role
//! permissions it toggles and to the permission probed when computing its
//! current value. `manage_members` is the one deliberate special case: the
//! probed permission depends on channel privacy.

use crate::model::ChannelType;
use std::fmt;

/// Underlying role permission identifiers used by the engine.
pub mod permissions {
    pub const CREATE_POST: &str = "create_post";
    pub const ADD_REACTION: &str = "add_reaction";
    pub const REMOVE_REACTION: &str = "remove_reaction";
    pub const USE_CHANNEL_MENTIONS: &str = "use_channel_mentions";
    pub const MANAGE_PUBLIC_CHANNEL_MEMBERS: &str = "manage_public_channel_members";
    pub const MANAGE_PRIVATE_CHANNEL_MEMBERS: &str = "manage_private_channel_members";
    pub const CONVERT_PUBLIC_CHANNEL_TO_PRIVATE: &str = "convert_public_channel_to_private";
    pub const CONVERT_PRIVATE_CHANNEL_TO_PUBLIC: &str = "convert_private_channel_to_public";
    pub const DELETE_PUBLIC_CHANNEL: &str = "delete_public_channel";
    pub const DELETE_PRIVATE_CHANNEL: &str = "delete_private_channel";
    pub const MANAGE_CHANNEL_ROLES: &str = "manage_channel_roles";
    pub const MANAGE_CHANNEL_PROPERTIES: &str = "manage_channel_properties";
    pub const MANAGE_SYSTEM: &str = "manage_system";
    pub const EDIT_OTHER_USERS: &str = "edit_other_users";
}

/// The fixed set of per-channel moderatable permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeratedPermission {
    CreatePost,
    CreateReactions,
    ManageMembers,
    UseChannelMentions,
}

impl ModeratedPermission {
    /// All moderated permissions, in presentation order.
    pub const ALL: [Self; 4] = [
        Self::CreatePost,
        Self::CreateReactions,
        Self::ManageMembers,
        Self::UseChannelMentions,
    ];

    /// Wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatePost => "create_post",
            Self::CreateReactions => "create_reactions",
            Self::ManageMembers => "manage_members",
            Self::UseChannelMentions => "use_channel_mentions",
        }
    }

    /// Parse a wire name; anything outside the closed set is rejected.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create_post" => Some(Self::CreatePost),
            "create_reactions" => Some(Self::CreateReactions),
            "manage_members" => Some(Self::ManageMembers),
            "use_channel_mentions" => Some(Self::UseChannelMentions),
            _ => None,
        }
    }

    /// The underlying role permissions a patch toggles. `manage_members`
    /// toggles both privacy variants so a later privacy conversion does not
    /// silently change the moderation.
    pub fn underlying(&self) -> &'static [&'static str] {
        match self {
            Self::CreatePost => &[permissions::CREATE_POST],
            Self::CreateReactions => &[permissions::ADD_REACTION, permissions::REMOVE_REACTION],
            Self::ManageMembers => &[
                permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS,
                permissions::MANAGE_PRIVATE_CHANNEL_MEMBERS,
            ],
            Self::UseChannelMentions => &[permissions::USE_CHANNEL_MENTIONS],
        }
    }

    /// The permission probed when reading the current value for a channel
    /// of the given type.
    pub fn probe(&self, channel_type: ChannelType) -> &'static str {
        match self {
            Self::ManageMembers => match channel_type {
                ChannelType::Private => permissions::MANAGE_PRIVATE_CHANNEL_MEMBERS,
                _ => permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS,
            },
            _ => self.underlying()[0],
        }
    }

    /// Guests cannot manage members, by definition; that entry carries no
    /// guest dimension.
    pub fn has_guest_dimension(&self) -> bool {
        !matches!(self, Self::ManageMembers)
    }
}

impl fmt::Display for ModeratedPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grant state of one role class for one moderated permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeratedGrant {
    /// Does the currently effective role grant the permission.
    pub value: bool,
    /// Could the role class be granted it at all (present in the higher
    /// scope). `enabled == false` forces `value == false`.
    pub enabled: bool,
}

/// One row of the moderation list returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationEntry {
    pub permission: ModeratedPermission,
    /// Absent for `manage_members`.
    pub guests: Option<ModeratedGrant>,
    pub members: ModeratedGrant,
}

/// Which role classes a patch addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RolePatchTarget {
    pub guests: Option<bool>,
    pub members: Option<bool>,
}

/// A single user-submitted moderation patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationPatch {
    pub permission: ModeratedPermission,
    pub roles: RolePatchTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_set_parses() {
        for p in ModeratedPermission::ALL {
            assert_eq!(ModeratedPermission::parse(p.as_str()), Some(p));
        }
        assert_eq!(ModeratedPermission::parse("delete_post"), None);
        assert_eq!(ModeratedPermission::parse(""), None);
    }

    #[test]
    fn manage_members_probe_follows_privacy() {
        let mm = ModeratedPermission::ManageMembers;
        assert_eq!(mm.probe(ChannelType::Open), permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS);
        assert_eq!(mm.probe(ChannelType::Private), permissions::MANAGE_PRIVATE_CHANNEL_MEMBERS);
    }

    #[test]
    fn manage_members_has_no_guest_dimension() {
        assert!(!ModeratedPermission::ManageMembers.has_guest_dimension());
        assert!(ModeratedPermission::CreatePost.has_guest_dimension());
    }

    #[test]
    fn create_reactions_toggles_both_reaction_permissions() {
        assert_eq!(
            ModeratedPermission::CreateReactions.underlying(),
            &[permissions::ADD_REACTION, permissions::REMOVE_REACTION]
        );
    }
}
