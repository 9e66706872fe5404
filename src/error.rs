//! Unified error handling for chanwarden.
//!
//! One engine-level error enum covering the five failure families
//! (validation, policy denial, authorization, not-found, integrity), with
//! metric labeling and automatic conversion from store errors.

use crate::model::ChannelType;
use crate::store::StoreError;
use thiserror::Error;

/// Failure family, used by callers to pick a rendering and by operators to
/// read aggregated metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; local, never retried, caller fault.
    Validation,
    /// A rule of the domain forbids the operation for this channel/user.
    /// Distinct from a generic permission failure so callers can render a
    /// specific message.
    PolicyDenied,
    /// The actor lacks the resolved permission.
    Authorization,
    /// A referenced entity does not exist.
    NotFound,
    /// Internal inconsistency; the operation fails closed.
    Integrity,
}

/// Errors produced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    #[error("invalid id: {0:?}")]
    InvalidId(String),

    #[error("invalid channel name: {0:?}")]
    InvalidChannelName(String),

    #[error("invalid display name")]
    InvalidDisplayName,

    #[error("channel name already taken: {0}")]
    NameTaken(String),

    #[error("invalid member role flags (guest={guest}, user={user}, admin={admin})")]
    InvalidRoleFlags { guest: bool, user: bool, admin: bool },

    #[error("not a moderated permission: {0}")]
    UnknownModeratedPermission(String),

    #[error("permission {0} cannot be granted: absent from the higher scope")]
    ModerationNotEnabled(String),

    #[error("scheme {0} does not have channel scope")]
    SchemeScopeMismatch(String),

    #[error("group channels need 3 to 8 distinct members, got {0}")]
    InvalidMemberCount(usize),

    #[error("channel {0} is archived")]
    ChannelArchived(String),

    // ------------------------------------------------------------------
    // Policy denial
    // ------------------------------------------------------------------
    #[error("operation {op} is invalid for {channel_type} channels")]
    TypeInvalid {
        op: &'static str,
        channel_type: ChannelType,
    },

    #[error("operation {0} is not permitted on the team's default channel")]
    DefaultChannelProtected(&'static str),

    #[error("user {0} denied by group constraint")]
    GroupConstraintDenied(String),

    #[error("member {0} of a group-constrained channel can only remove themselves")]
    GroupConstrainedRemoval(String),

    #[error("channel members are not all members of team {0}")]
    MembersNotInTeam(String),

    #[error("operation {0} is disabled by configuration")]
    FeatureDisabled(&'static str),

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    // ------------------------------------------------------------------
    // Not found
    // ------------------------------------------------------------------
    #[error("no such channel: {0}")]
    ChannelNotFound(String),

    #[error("user {user_id} is not a member of channel {channel_id}")]
    MemberNotFound { channel_id: String, user_id: String },

    #[error("no such scheme: {0}")]
    SchemeNotFound(String),

    #[error("no such role: {0}")]
    RoleNotFound(String),

    #[error("no such team: {0}")]
    TeamNotFound(String),

    #[error("no such user: {0}")]
    UserNotFound(String),

    // ------------------------------------------------------------------
    // Integrity
    // ------------------------------------------------------------------
    #[error("data integrity fault: {0}")]
    Integrity(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Which of the five failure families this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId(_)
            | Self::InvalidChannelName(_)
            | Self::InvalidDisplayName
            | Self::NameTaken(_)
            | Self::InvalidRoleFlags { .. }
            | Self::UnknownModeratedPermission(_)
            | Self::ModerationNotEnabled(_)
            | Self::SchemeScopeMismatch(_)
            | Self::InvalidMemberCount(_)
            | Self::ChannelArchived(_) => ErrorKind::Validation,

            Self::TypeInvalid { .. }
            | Self::DefaultChannelProtected(_)
            | Self::GroupConstraintDenied(_)
            | Self::GroupConstrainedRemoval(_)
            | Self::MembersNotInTeam(_)
            | Self::FeatureDisabled(_) => ErrorKind::PolicyDenied,

            Self::PermissionDenied(_) => ErrorKind::Authorization,

            Self::ChannelNotFound(_)
            | Self::MemberNotFound { .. }
            | Self::SchemeNotFound(_)
            | Self::RoleNotFound(_)
            | Self::TeamNotFound(_)
            | Self::UserNotFound(_) => ErrorKind::NotFound,

            Self::Integrity(_) | Self::Store(_) => ErrorKind::Integrity,
        }
    }

    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidId(_) => "invalid_id",
            Self::InvalidChannelName(_) => "invalid_channel_name",
            Self::InvalidDisplayName => "invalid_display_name",
            Self::NameTaken(_) => "name_taken",
            Self::InvalidRoleFlags { .. } => "invalid_role_flags",
            Self::UnknownModeratedPermission(_) => "unknown_moderated_permission",
            Self::ModerationNotEnabled(_) => "moderation_not_enabled",
            Self::SchemeScopeMismatch(_) => "scheme_scope_mismatch",
            Self::InvalidMemberCount(_) => "invalid_member_count",
            Self::ChannelArchived(_) => "channel_archived",
            Self::TypeInvalid { .. } => "type_invalid",
            Self::DefaultChannelProtected(_) => "default_channel_protected",
            Self::GroupConstraintDenied(_) => "group_constraint_denied",
            Self::GroupConstrainedRemoval(_) => "group_constrained_removal",
            Self::MembersNotInTeam(_) => "members_not_in_team",
            Self::FeatureDisabled(_) => "feature_disabled",
            Self::PermissionDenied(_) => "permission_denied",
            Self::ChannelNotFound(_) => "channel_not_found",
            Self::MemberNotFound { .. } => "member_not_found",
            Self::SchemeNotFound(_) => "scheme_not_found",
            Self::RoleNotFound(_) => "role_not_found",
            Self::TeamNotFound(_) => "team_not_found",
            Self::UserNotFound(_) => "user_not_found",
            Self::Integrity(_) => "integrity",
            Self::Store(_) => "store",
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
