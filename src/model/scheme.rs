//! Schemes and roles.
//!
//! A scheme bundles the three role assignments (guest/user/admin) applied at
//! Team or Channel scope. Roles are read-only inputs to the engine except
//! for the channel-scope clones materialized by moderation patches.

use std::collections::BTreeSet;
use std::fmt;

/// System-default role names, used when no scheme overrides them.
pub const DEFAULT_CHANNEL_GUEST_ROLE: &str = "channel_guest";
pub const DEFAULT_CHANNEL_USER_ROLE: &str = "channel_user";
pub const DEFAULT_CHANNEL_ADMIN_ROLE: &str = "channel_admin";

/// Scope a scheme applies at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeScope {
    Team,
    Channel,
}

impl SchemeScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::Channel => "channel",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "team" => Some(Self::Team),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}

impl fmt::Display for SchemeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheme record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    pub id: String,
    pub name: String,
    pub scope: SchemeScope,
    /// Role name for the guest class. May be blank on pre-guest-account
    /// data; a blank value means "no guest override available", not an
    /// error.
    pub default_channel_guest_role: String,
    pub default_channel_user_role: String,
    pub default_channel_admin_role: String,
    pub create_at: i64,
    /// 0 = active; epoch millis = soft-deleted.
    pub delete_at: i64,
}

impl Scheme {
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }
}

/// A named permission set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub permissions: BTreeSet<String>,
    /// True for the fixed system roles seeded at install time.
    pub built_in: bool,
    pub create_at: i64,
    pub delete_at: i64,
}

impl Role {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// The three effective role names resolved for a channel.
///
/// `guest` is `None` when no scope in the chain defines a guest role (blank
/// guest slot on the winning scheme).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTriple {
    pub guest: Option<String>,
    pub user: String,
    pub admin: String,
}

impl RoleTriple {
    /// The fixed system defaults, always resolvable.
    pub fn system_default() -> Self {
        Self {
            guest: Some(DEFAULT_CHANNEL_GUEST_ROLE.to_string()),
            user: DEFAULT_CHANNEL_USER_ROLE.to_string(),
            admin: DEFAULT_CHANNEL_ADMIN_ROLE.to_string(),
        }
    }

    /// Build a triple from a scheme's three role-name slots.
    pub fn from_scheme(scheme: &Scheme) -> Self {
        let guest = if scheme.default_channel_guest_role.is_empty() {
            None
        } else {
            Some(scheme.default_channel_guest_role.clone())
        };
        Self {
            guest,
            user: scheme.default_channel_user_role.clone(),
            admin: scheme.default_channel_admin_role.clone(),
        }
    }
}
