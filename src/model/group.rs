//! Group-to-channel links.

/// What a group link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncableType {
    Channel,
    Team,
}

impl SyncableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Team => "team",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "channel" => Some(Self::Channel),
            "team" => Some(Self::Team),
            _ => None,
        }
    }
}

/// A link between a group and a channel (or team). At least one active
/// channel link is what legitimizes membership for a user of that group on
/// a group-constrained channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSyncable {
    pub group_id: String,
    pub syncable_id: String,
    pub syncable_type: SyncableType,
    pub auto_add: bool,
    pub create_at: i64,
    pub delete_at: i64,
}

impl GroupSyncable {
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }
}
