//! Minimal user projection.

/// The slice of a user the engine needs: identity, whether the account is a
/// bot (bots are exempt from the group-constrained removal rule), and
/// whether it is a guest account (guests join channels with the guest flag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub is_bot: bool,
    pub is_guest: bool,
    pub create_at: i64,
    pub delete_at: i64,
}
