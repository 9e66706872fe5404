//! Change-notification seam.
//!
//! The engine reports committed mutations to an optional observer; a
//! real-time delivery layer (websocket fan-out, cluster bus) hangs off this
//! trait. Delivery is notify-after-commit, at-most-once: hooks return `()`
//! and can never roll back or fail the mutation they describe.

/// Trait for observing committed engine mutations.
///
/// All timestamps are epoch milliseconds of the commit.
pub trait EngineObserver: Send + Sync {
    /// A channel changed privacy type.
    fn channel_converted(&self, channel_id: &str, at: i64);

    /// A channel was archived (soft-deleted).
    fn channel_archived(&self, channel_id: &str, at: i64);

    /// An archived channel was restored.
    fn channel_restored(&self, channel_id: &str, at: i64);

    /// A channel was moved to another team.
    fn channel_moved(&self, channel_id: &str, team_id: &str, at: i64);

    /// A user joined or was added to a channel.
    fn member_added(&self, channel_id: &str, user_id: &str, at: i64);

    /// A user left or was removed from a channel.
    fn member_removed(&self, channel_id: &str, user_id: &str, at: i64);

    /// A member's scheme role flags changed.
    fn member_roles_changed(&self, channel_id: &str, user_id: &str, at: i64);
}
