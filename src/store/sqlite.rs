//! SQLite-backed store implementation.
//!
//! Async SQLite access via SQLx with embedded migrations. WAL mode keeps
//! reads concurrent with writes; foreign keys are enforced for the
//! membership cascade on permanent channel deletion.

use super::{ChannelStore, StoreError, TeamMembership};
use crate::model::{
    Channel, ChannelMember, ChannelType, GroupSyncable, MemberRoles, NotifyProps, Role, Scheme,
    SchemeScope, SyncableType, Team, UserProfile,
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store handle with connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open a store, running migrations if needed.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:chanwarden-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Store connected");

        sqlx::migrate!("./migrations").run(&pool).await?;

        // WAL mode allows reads to happen while writes are in progress.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        // Needed for the ON DELETE CASCADE on channel_members.
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ============================================================================
// Row mapping
// ============================================================================

type ChannelRow = (
    String,         // id
    String,         // type
    Option<String>, // team_id
    String,         // name
    String,         // display_name
    String,         // creator_id
    Option<String>, // scheme_id
    bool,           // group_constrained
    i64,            // create_at
    i64,            // update_at
    i64,            // delete_at
);

const CHANNEL_COLUMNS: &str = "id, type, team_id, name, display_name, creator_id, scheme_id, \
                               group_constrained, create_at, update_at, delete_at";

fn channel_from_row(row: ChannelRow) -> Result<Channel, StoreError> {
    let (
        id,
        type_tag,
        team_id,
        name,
        display_name,
        creator_id,
        scheme_id,
        group_constrained,
        create_at,
        update_at,
        delete_at,
    ) = row;
    let channel_type = ChannelType::from_tag(&type_tag)
        .ok_or_else(|| StoreError::Encoding(format!("unknown channel type tag {type_tag:?}")))?;
    Ok(Channel {
        id,
        channel_type,
        team_id,
        name,
        display_name,
        creator_id,
        scheme_id,
        group_constrained,
        create_at,
        update_at,
        delete_at,
    })
}

type MemberRow = (
    String,      // channel_id
    String,      // user_id
    bool,        // scheme_guest
    bool,        // scheme_user
    bool,        // scheme_admin
    String,      // notify_props
    i64,         // msg_count
    i64,         // mention_count
    Option<i64>, // mention_count_root
    i64,         // last_viewed_at
    i64,         // last_update_at
);

const MEMBER_COLUMNS: &str = "channel_id, user_id, scheme_guest, scheme_user, scheme_admin, \
                              notify_props, msg_count, mention_count, mention_count_root, \
                              last_viewed_at, last_update_at";

fn member_from_row(row: MemberRow) -> Result<ChannelMember, StoreError> {
    let (
        channel_id,
        user_id,
        scheme_guest,
        scheme_user,
        scheme_admin,
        notify_props,
        msg_count,
        mention_count,
        mention_count_root,
        last_viewed_at,
        last_update_at,
    ) = row;
    let notify_props: NotifyProps = serde_json::from_str(&notify_props)
        .map_err(|e| StoreError::Encoding(format!("notify_props: {e}")))?;
    Ok(ChannelMember {
        channel_id,
        user_id,
        roles: MemberRoles {
            scheme_guest,
            scheme_user,
            scheme_admin,
        },
        notify_props,
        msg_count,
        mention_count,
        mention_count_root,
        last_viewed_at,
        last_update_at,
    })
}

fn encode_notify_props(props: &NotifyProps) -> Result<String, StoreError> {
    serde_json::to_string(props).map_err(|e| StoreError::Encoding(format!("notify_props: {e}")))
}

fn decode_permissions(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn encode_permissions(permissions: &BTreeSet<String>) -> String {
    permissions.iter().cloned().collect::<Vec<_>>().join(" ")
}

/// `?, ?, ...` for a dynamic IN list.
fn placeholders(count: usize) -> String {
    let mut s = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            s.push_str(", ");
        }
        s.push('?');
    }
    s
}

// ============================================================================
// ChannelStore implementation
// ============================================================================

#[async_trait]
impl ChannelStore for SqliteStore {
    async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>, StoreError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"
        ))
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(channel_from_row).transpose()
    }

    async fn get_channel_by_name(
        &self,
        team_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Channel>, StoreError> {
        let row = match team_id {
            Some(team_id) => {
                sqlx::query_as::<_, ChannelRow>(&format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE team_id = ? AND name = ?"
                ))
                .bind(team_id)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChannelRow>(&format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE team_id IS NULL AND name = ?"
                ))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.map(channel_from_row).transpose()
    }

    async fn save_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO channels (id, type, team_id, name, display_name, creator_id, scheme_id,
                                  group_constrained, create_at, update_at, delete_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&channel.id)
        .bind(channel.channel_type.as_str())
        .bind(&channel.team_id)
        .bind(&channel.name)
        .bind(&channel.display_name)
        .bind(&channel.creator_id)
        .bind(&channel.scheme_id)
        .bind(channel.group_constrained)
        .bind(channel.create_at)
        .bind(channel.update_at)
        .bind(channel.delete_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_channel(&self, channel: &Channel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE channels
            SET type = ?, team_id = ?, name = ?, display_name = ?, scheme_id = ?,
                group_constrained = ?, update_at = ?, delete_at = ?
            WHERE id = ?
            "#,
        )
        .bind(channel.channel_type.as_str())
        .bind(&channel.team_id)
        .bind(&channel.name)
        .bind(&channel.display_name)
        .bind(&channel.scheme_id)
        .bind(channel.group_constrained)
        .bind(channel.update_at)
        .bind(channel.delete_at)
        .bind(&channel.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_member(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Option<ChannelMember>, StoreError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM channel_members WHERE channel_id = ? AND user_id = ?"
        ))
        .bind(channel_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(member_from_row).transpose()
    }

    async fn list_members(&self, channel_id: &str) -> Result<Vec<ChannelMember>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM channel_members WHERE channel_id = ? ORDER BY user_id"
        ))
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(member_from_row).collect()
    }

    async fn count_members(&self, channel_id: &str) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM channel_members WHERE channel_id = ?")
                .bind(channel_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn save_member(&self, member: &ChannelMember) -> Result<(), StoreError> {
        let notify_props = encode_notify_props(&member.notify_props)?;
        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, user_id, scheme_guest, scheme_user,
                                         scheme_admin, notify_props, msg_count, mention_count,
                                         mention_count_root, last_viewed_at, last_update_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (channel_id, user_id) DO UPDATE SET
                scheme_guest = excluded.scheme_guest,
                scheme_user = excluded.scheme_user,
                scheme_admin = excluded.scheme_admin,
                notify_props = excluded.notify_props,
                msg_count = excluded.msg_count,
                mention_count = excluded.mention_count,
                mention_count_root = excluded.mention_count_root,
                last_viewed_at = excluded.last_viewed_at,
                last_update_at = excluded.last_update_at
            "#,
        )
        .bind(&member.channel_id)
        .bind(&member.user_id)
        .bind(member.roles.scheme_guest)
        .bind(member.roles.scheme_user)
        .bind(member.roles.scheme_admin)
        .bind(notify_props)
        .bind(member.msg_count)
        .bind(member.mention_count)
        .bind(member.mention_count_root)
        .bind(member.last_viewed_at)
        .bind(member.last_update_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_member(&self, channel_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM channel_members WHERE channel_id = ? AND user_id = ?")
            .bind(channel_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn members_minus_group_members(
        &self,
        channel_id: &str,
        group_ids: &[String],
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<UserProfile>, i64), StoreError> {
        // With no groups given, the complement is the whole member list.
        let exclusion = if group_ids.is_empty() {
            String::new()
        } else {
            format!(
                "AND NOT EXISTS (SELECT 1 FROM group_members gm
                                 WHERE gm.user_id = cm.user_id
                                   AND gm.delete_at = 0
                                   AND gm.group_id IN ({}))",
                placeholders(group_ids.len())
            )
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM channel_members cm WHERE cm.channel_id = ? {exclusion}"
        );
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(channel_id);
        for group_id in group_ids {
            count_query = count_query.bind(group_id);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT u.id, u.username, u.is_bot, u.is_guest, u.create_at, u.delete_at
             FROM channel_members cm
             JOIN users u ON u.id = cm.user_id
             WHERE cm.channel_id = ? {exclusion}
             ORDER BY u.id
             LIMIT ? OFFSET ?"
        );
        let mut page_query =
            sqlx::query_as::<_, UserRow>(&page_sql).bind(channel_id);
        for group_id in group_ids {
            page_query = page_query.bind(group_id);
        }
        let rows = page_query
            .bind(per_page as i64)
            .bind((page * per_page) as i64)
            .fetch_all(&self.pool)
            .await?;

        let users = rows.into_iter().map(user_from_row).collect();
        Ok((users, total))
    }

    async fn get_scheme(&self, scheme_id: &str) -> Result<Option<Scheme>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, String, String, String, i64, i64)>(
            r#"
            SELECT id, name, scope, default_channel_guest_role, default_channel_user_role,
                   default_channel_admin_role, create_at, delete_at
            FROM schemes
            WHERE id = ?
            "#,
        )
        .bind(scheme_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(
            |(id, name, scope, guest_role, user_role, admin_role, create_at, delete_at)| {
                let scope = SchemeScope::from_tag(&scope)
                    .ok_or_else(|| StoreError::Encoding(format!("unknown scheme scope {scope:?}")))?;
                Ok(Scheme {
                    id,
                    name,
                    scope,
                    default_channel_guest_role: guest_role,
                    default_channel_user_role: user_role,
                    default_channel_admin_role: admin_role,
                    create_at,
                    delete_at,
                })
            },
        )
        .transpose()
    }

    async fn save_scheme(&self, scheme: &Scheme) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO schemes (id, name, scope, default_channel_guest_role,
                                 default_channel_user_role, default_channel_admin_role,
                                 create_at, delete_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                default_channel_guest_role = excluded.default_channel_guest_role,
                default_channel_user_role = excluded.default_channel_user_role,
                default_channel_admin_role = excluded.default_channel_admin_role,
                delete_at = excluded.delete_at
            "#,
        )
        .bind(&scheme.id)
        .bind(&scheme.name)
        .bind(scheme.scope.as_str())
        .bind(&scheme.default_channel_guest_role)
        .bind(&scheme.default_channel_user_role)
        .bind(&scheme.default_channel_admin_role)
        .bind(scheme.create_at)
        .bind(scheme.delete_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_scheme(&self, scheme_id: &str, delete_at: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE schemes SET delete_at = ? WHERE id = ?")
            .bind(delete_at)
            .bind(scheme_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_role(&self, role_id: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, bool, i64, i64)>(
            "SELECT id, name, permissions, built_in, create_at, delete_at FROM roles WHERE id = ?",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(role_from_row))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, bool, i64, i64)>(
            "SELECT id, name, permissions, built_in, create_at, delete_at FROM roles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(role_from_row))
    }

    async fn save_role(&self, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, permissions, built_in, create_at, delete_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                permissions = excluded.permissions,
                delete_at = excluded.delete_at
            "#,
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(encode_permissions(&role.permissions))
        .bind(role.built_in)
        .bind(role.create_at)
        .bind(role.delete_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_team(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, i64, i64)>(
            "SELECT id, name, display_name, scheme_id, create_at, delete_at FROM teams WHERE id = ?",
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, name, display_name, scheme_id, create_at, delete_at)| Team {
                id,
                name,
                display_name,
                scheme_id,
                create_at,
                delete_at,
            },
        ))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, is_bot, is_guest, create_at, delete_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn group_syncables_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<GroupSyncable>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, bool, i64, i64)>(
            r#"
            SELECT group_id, syncable_id, syncable_type, auto_add, create_at, delete_at
            FROM group_syncables
            WHERE syncable_id = ? AND syncable_type = 'channel' AND delete_at = 0
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(group_id, syncable_id, syncable_type, auto_add, create_at, delete_at)| {
                    let syncable_type = SyncableType::from_tag(&syncable_type).ok_or_else(|| {
                        StoreError::Encoding(format!("unknown syncable type {syncable_type:?}"))
                    })?;
                    Ok(GroupSyncable {
                        group_id,
                        syncable_id,
                        syncable_type,
                        auto_add,
                        create_at,
                        delete_at,
                    })
                },
            )
            .collect()
    }

    async fn is_user_in_any_group(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> Result<bool, StoreError> {
        if group_ids.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM group_members
             WHERE user_id = ? AND delete_at = 0 AND group_id IN ({})",
            placeholders(group_ids.len())
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(user_id);
        for group_id in group_ids {
            query = query.bind(group_id);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    async fn count_root_mentions(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mention_history
             WHERE channel_id = ? AND user_id = ? AND root_post = 1",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn record_mention(
        &self,
        channel_id: &str,
        user_id: &str,
        root_post: bool,
        create_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mention_history (channel_id, user_id, root_post, create_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(root_post)
        .bind(create_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn role_from_row(row: (String, String, String, bool, i64, i64)) -> Role {
    let (id, name, permissions, built_in, create_at, delete_at) = row;
    Role {
        id,
        name,
        permissions: decode_permissions(&permissions),
        built_in,
        create_at,
        delete_at,
    }
}

type UserRow = (String, String, bool, bool, i64, i64);

fn user_from_row(row: UserRow) -> UserProfile {
    let (id, username, is_bot, is_guest, create_at, delete_at) = row;
    UserProfile {
        id,
        username,
        is_bot,
        is_guest,
        create_at,
        delete_at,
    }
}

#[async_trait]
impl TeamMembership for SqliteStore {
    async fn is_team_member(&self, team_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM team_members WHERE team_id = ? AND user_id = ? AND delete_at = 0",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
