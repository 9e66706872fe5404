//! Persistence adapter for the channel engine.
//!
//! The engine only ever talks to the [`ChannelStore`] and [`TeamMembership`]
//! traits; [`SqliteStore`] is the bundled implementation. All blocking is
//! confined here, and the engine treats every call as a synchronous
//! dependency with no internal retries.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::model::{
    Channel, ChannelMember, GroupSyncable, Role, Scheme, Team, UserProfile,
};
use async_trait::async_trait;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("stored value could not be decoded: {0}")]
    Encoding(String),
}

/// Read/write surface the engine consumes from persistence.
///
/// Writes are individually atomic; multi-entity invariants are the engine's
/// job (it serializes per channel). Soft deletion is expressed in the data
/// (`delete_at`), hard deletion only through [`Self::delete_channel`].
#[async_trait]
pub trait ChannelStore: Send + Sync {
    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------
    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, StoreError>;

    /// Lookup by per-team unique name. `team_id` of `None` addresses the
    /// teamless (Direct/Group) namespace.
    async fn get_channel_by_name(
        &self,
        team_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Channel>, StoreError>;

    /// Insert a new channel.
    async fn save_channel(&self, channel: &Channel) -> Result<(), StoreError>;

    /// Persist changes to an existing channel.
    async fn update_channel(&self, channel: &Channel) -> Result<(), StoreError>;

    /// Physically remove a channel and its membership rows.
    async fn delete_channel(&self, channel_id: &str) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------
    async fn get_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<ChannelMember>, StoreError>;

    async fn list_members(&self, channel_id: &str) -> Result<Vec<ChannelMember>, StoreError>;

    async fn count_members(&self, channel_id: &str) -> Result<i64, StoreError>;

    /// Insert or replace a membership row.
    async fn save_member(&self, member: &ChannelMember) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    async fn delete_member(&self, channel_id: &str, user_id: &str) -> Result<bool, StoreError>;

    /// Channel members belonging to none of `group_ids`, with the total
    /// count of such members. Count and page use the same predicate;
    /// ordering is stable by user id.
    async fn members_minus_group_members(
        &self,
        channel_id: &str,
        group_ids: &[String],
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<UserProfile>, i64), StoreError>;

    // ------------------------------------------------------------------
    // Schemes and roles
    // ------------------------------------------------------------------
    async fn get_scheme(&self, scheme_id: &str) -> Result<Option<Scheme>, StoreError>;

    async fn save_scheme(&self, scheme: &Scheme) -> Result<(), StoreError>;

    /// Soft-delete a scheme (sets `delete_at`).
    async fn delete_scheme(&self, scheme_id: &str, delete_at: i64) -> Result<(), StoreError>;

    async fn get_role(&self, role_id: &str) -> Result<Option<Role>, StoreError>;

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    /// Insert a role or replace its permission set.
    async fn save_role(&self, role: &Role) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Teams, users, groups
    // ------------------------------------------------------------------
    async fn get_team(&self, team_id: &str) -> Result<Option<Team>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Active group links pointing at this channel.
    async fn group_syncables_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<GroupSyncable>, StoreError>;

    /// Whether the user belongs to at least one of the given groups.
    async fn is_user_in_any_group(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> Result<bool, StoreError>;

    // ------------------------------------------------------------------
    // Mention history (unread accounting)
    // ------------------------------------------------------------------
    /// Unread root-post mentions recorded for the member since their last
    /// view; used to backfill `mention_count_root`.
    async fn count_root_mentions(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<i64, StoreError>;

    /// Append a mention event to the history.
    async fn record_mention(
        &self,
        channel_id: &str,
        user_id: &str,
        root_post: bool,
        create_at: i64,
    ) -> Result<(), StoreError>;
}

/// Team-membership collaborator. Consumed, never re-specified: the engine
/// only asks the one question it needs for channel moves.
#[async_trait]
pub trait TeamMembership: Send + Sync {
    async fn is_team_member(&self, team_id: &str, user_id: &str) -> Result<bool, StoreError>;
}
