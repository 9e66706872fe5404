//! Channel types and naming rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four channel kinds.
///
/// `Direct` and `Group` channels are teamless and their membership is fixed
/// at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    Open,
    Private,
    Direct,
    Group,
}

impl ChannelType {
    /// Single-letter storage tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "O",
            Self::Private => "P",
            Self::Direct => "D",
            Self::Group => "G",
        }
    }

    /// Parse the storage tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "O" => Some(Self::Open),
            "P" => Some(Self::Private),
            "D" => Some(Self::Direct),
            "G" => Some(Self::Group),
            _ => None,
        }
    }

    /// Direct and Group channels: no team, no type transitions, membership
    /// immutable after creation.
    pub fn is_peer_to_peer(&self) -> bool {
        matches!(self, Self::Direct | Self::Group)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Private => "private",
            Self::Direct => "direct",
            Self::Group => "group",
        };
        f.write_str(name)
    }
}

/// A channel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub channel_type: ChannelType,
    /// Absent for Direct/Group channels.
    pub team_id: Option<String>,
    /// URL-safe name, unique per team for Open/Private.
    pub name: String,
    pub display_name: String,
    pub creator_id: String,
    /// Channel-scope scheme override, if any.
    pub scheme_id: Option<String>,
    /// Membership must stay a subset of the linked groups' members.
    pub group_constrained: bool,
    pub create_at: i64,
    pub update_at: i64,
    /// 0 = active; epoch millis = archived.
    pub delete_at: i64,
}

impl Channel {
    /// Whether the channel has been archived (soft-deleted).
    pub fn is_archived(&self) -> bool {
        self.delete_at != 0
    }
}

/// Validate a channel's URL name: lowercase alphanumerics and hyphens,
/// 1..=64 bytes, no leading/trailing hyphen.
pub fn is_valid_channel_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    if name.starts_with('-') || name.ends_with('-') {
        return false;
    }
    name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Deterministic name for the direct channel between two users, independent
/// of argument order.
pub fn direct_channel_name(user_a: &str, user_b: &str) -> String {
    if user_a < user_b {
        format!("{}__{}", user_a, user_b)
    } else {
        format!("{}__{}", user_b, user_a)
    }
}

/// Deterministic name for a group channel over a member set.
pub fn group_channel_name(user_ids: &[String]) -> String {
    let mut ids: Vec<&str> = user_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_round_trip() {
        for t in [ChannelType::Open, ChannelType::Private, ChannelType::Direct, ChannelType::Group] {
            assert_eq!(ChannelType::from_tag(t.as_str()), Some(t));
        }
        assert_eq!(ChannelType::from_tag("X"), None);
    }

    #[test]
    fn peer_to_peer_types() {
        assert!(ChannelType::Direct.is_peer_to_peer());
        assert!(ChannelType::Group.is_peer_to_peer());
        assert!(!ChannelType::Open.is_peer_to_peer());
        assert!(!ChannelType::Private.is_peer_to_peer());
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_channel_name("town-square"));
        assert!(is_valid_channel_name("a"));
        assert!(!is_valid_channel_name(""));
        assert!(!is_valid_channel_name("Has-Caps"));
        assert!(!is_valid_channel_name("-leading"));
        assert!(!is_valid_channel_name("trailing-"));
        assert!(!is_valid_channel_name(&"a".repeat(65)));
    }

    #[test]
    fn direct_name_is_order_independent() {
        assert_eq!(direct_channel_name("u2", "u1"), direct_channel_name("u1", "u2"));
        assert_eq!(direct_channel_name("u1", "u2"), "u1__u2");
    }

    #[test]
    fn group_name_sorts_and_dedups() {
        let ids = vec!["c".to_string(), "a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(group_channel_name(&ids), "a__b__c");
    }
}
