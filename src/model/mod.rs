//! Plain data types shared by the store and the engine.

mod channel;
mod group;
mod member;
mod permission;
mod scheme;
mod team;
mod user;

pub use channel::{Channel, ChannelType, direct_channel_name, group_channel_name, is_valid_channel_name};
pub use group::{GroupSyncable, SyncableType};
pub use member::{ChannelMember, ChannelUnread, MemberRoles, NotifyProps, default_notify_props};
pub use permission::{
    ModeratedGrant, ModeratedPermission, ModerationEntry, ModerationPatch, RolePatchTarget,
    permissions,
};
pub use scheme::{
    DEFAULT_CHANNEL_ADMIN_ROLE, DEFAULT_CHANNEL_GUEST_ROLE, DEFAULT_CHANNEL_USER_ROLE, Role,
    RoleTriple, Scheme, SchemeScope,
};
pub use team::Team;
pub use user::UserProfile;

/// Generate a new opaque identifier (32 lowercase hex chars).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Check that an externally supplied identifier is shaped like one of ours.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
