//! Shared test harness: an engine over a fresh in-memory store with a
//! seeded team and a small cast of users.

#![allow(dead_code)]

use chanwarden::engine::EngineObserver;
use chanwarden::model::{Scheme, SchemeScope, new_id};
use chanwarden::{ChannelEngine, EngineConfig, SqliteStore};
use std::sync::{Arc, Mutex};

pub const TEAM_ID: &str = "team1";
pub const OTHER_TEAM_ID: &str = "team2";

/// alice, bob and carol are regular users; frank is a bot; gina is a guest.
pub const ALICE: &str = "alice1";
pub const BOB: &str = "bob1";
pub const CAROL: &str = "carol1";
pub const FRANK_BOT: &str = "frank1";
pub const GINA_GUEST: &str = "gina1";

pub struct Harness {
    pub engine: ChannelEngine,
    pub store: Arc<SqliteStore>,
    pub observer: Arc<RecordingObserver>,
}

pub async fn setup() -> Harness {
    setup_with_config(EngineConfig::default()).await
}

pub async fn setup_with_config(config: EngineConfig) -> Harness {
    let store = Arc::new(SqliteStore::open(":memory:").await.expect("open store"));
    let observer = Arc::new(RecordingObserver::default());
    let engine = ChannelEngine::new(store.clone(), store.clone(), config)
        .with_observer(observer.clone());

    insert_team(&store, TEAM_ID, "main").await;
    insert_team(&store, OTHER_TEAM_ID, "annex").await;

    insert_user(&store, ALICE, "alice", false, false).await;
    insert_user(&store, BOB, "bob", false, false).await;
    insert_user(&store, CAROL, "carol", false, false).await;
    insert_user(&store, FRANK_BOT, "frank", true, false).await;
    insert_user(&store, GINA_GUEST, "gina", false, true).await;

    for user in [ALICE, BOB, CAROL, FRANK_BOT, GINA_GUEST] {
        add_team_member(&store, TEAM_ID, user).await;
    }

    Harness {
        engine,
        store,
        observer,
    }
}

pub async fn insert_team(store: &SqliteStore, id: &str, name: &str) {
    sqlx::query("INSERT INTO teams (id, name, display_name, create_at) VALUES (?, ?, ?, 0)")
        .bind(id)
        .bind(name)
        .bind(name)
        .execute(store.pool())
        .await
        .expect("insert team");
}

pub async fn insert_user(store: &SqliteStore, id: &str, username: &str, is_bot: bool, is_guest: bool) {
    sqlx::query("INSERT INTO users (id, username, is_bot, is_guest, create_at) VALUES (?, ?, ?, ?, 0)")
        .bind(id)
        .bind(username)
        .bind(is_bot)
        .bind(is_guest)
        .execute(store.pool())
        .await
        .expect("insert user");
}

pub async fn add_team_member(store: &SqliteStore, team_id: &str, user_id: &str) {
    sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES (?, ?)")
        .bind(team_id)
        .bind(user_id)
        .execute(store.pool())
        .await
        .expect("insert team member");
}

pub async fn remove_team_member(store: &SqliteStore, team_id: &str, user_id: &str) {
    sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
        .bind(team_id)
        .bind(user_id)
        .execute(store.pool())
        .await
        .expect("delete team member");
}

pub async fn insert_group(store: &SqliteStore, id: &str, name: &str) {
    sqlx::query("INSERT INTO user_groups (id, name, create_at) VALUES (?, ?, 0)")
        .bind(id)
        .bind(name)
        .execute(store.pool())
        .await
        .expect("insert group");
}

pub async fn add_group_member(store: &SqliteStore, group_id: &str, user_id: &str) {
    sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES (?, ?)")
        .bind(group_id)
        .bind(user_id)
        .execute(store.pool())
        .await
        .expect("insert group member");
}

pub async fn link_group_to_channel(store: &SqliteStore, group_id: &str, channel_id: &str) {
    sqlx::query(
        "INSERT INTO group_syncables (group_id, syncable_id, syncable_type, create_at)
         VALUES (?, ?, 'channel', 0)",
    )
    .bind(group_id)
    .bind(channel_id)
    .execute(store.pool())
    .await
    .expect("insert group syncable");
}

/// Clone a seeded role under a new name so a test scheme can mutate it
/// without touching the system defaults.
pub async fn clone_role(store: &SqliteStore, source_name: &str, new_name: &str) {
    use chanwarden::ChannelStore;
    let mut role = store
        .get_role_by_name(source_name)
        .await
        .expect("get role")
        .expect("source role exists");
    role.id = new_id();
    role.name = new_name.to_string();
    role.built_in = false;
    store.save_role(&role).await.expect("save cloned role");
}

/// Create a scheme whose three roles are clones of the system defaults.
pub async fn make_scheme(store: &SqliteStore, scope: SchemeScope, tag: &str) -> Scheme {
    use chanwarden::ChannelStore;
    let guest_role = format!("{tag}_guest");
    let user_role = format!("{tag}_user");
    let admin_role = format!("{tag}_admin");
    clone_role(store, "channel_guest", &guest_role).await;
    clone_role(store, "channel_user", &user_role).await;
    clone_role(store, "channel_admin", &admin_role).await;

    let scheme = Scheme {
        id: format!("scheme_{tag}"),
        name: tag.to_string(),
        scope,
        default_channel_guest_role: guest_role,
        default_channel_user_role: user_role,
        default_channel_admin_role: admin_role,
        create_at: 0,
        delete_at: 0,
    };
    store.save_scheme(&scheme).await.expect("save scheme");
    scheme
}

pub async fn assign_team_scheme(store: &SqliteStore, team_id: &str, scheme_id: &str) {
    sqlx::query("UPDATE teams SET scheme_id = ? WHERE id = ?")
        .bind(scheme_id)
        .bind(team_id)
        .execute(store.pool())
        .await
        .expect("assign team scheme");
}

pub async fn assign_channel_scheme(store: &SqliteStore, channel_id: &str, scheme_id: &str) {
    use chanwarden::ChannelStore;
    let mut channel = store
        .get_channel(channel_id)
        .await
        .expect("get channel")
        .expect("channel exists");
    channel.scheme_id = Some(scheme_id.to_string());
    store.update_channel(&channel).await.expect("update channel");
}

pub async fn remove_permission_from_role(store: &SqliteStore, role_name: &str, permission: &str) {
    use chanwarden::ChannelStore;
    let mut role = store
        .get_role_by_name(role_name)
        .await
        .expect("get role")
        .expect("role exists");
    role.permissions.remove(permission);
    store.save_role(&role).await.expect("save role");
}

/// Observer that records every notification it receives.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == event)
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl EngineObserver for RecordingObserver {
    fn channel_converted(&self, channel_id: &str, _at: i64) {
        self.push(format!("converted:{channel_id}"));
    }

    fn channel_archived(&self, channel_id: &str, _at: i64) {
        self.push(format!("archived:{channel_id}"));
    }

    fn channel_restored(&self, channel_id: &str, _at: i64) {
        self.push(format!("restored:{channel_id}"));
    }

    fn channel_moved(&self, channel_id: &str, team_id: &str, _at: i64) {
        self.push(format!("moved:{channel_id}:{team_id}"));
    }

    fn member_added(&self, channel_id: &str, user_id: &str, _at: i64) {
        self.push(format!("member_added:{channel_id}:{user_id}"));
    }

    fn member_removed(&self, channel_id: &str, user_id: &str, _at: i64) {
        self.push(format!("member_removed:{channel_id}:{user_id}"));
    }

    fn member_roles_changed(&self, channel_id: &str, user_id: &str, _at: i64) {
        self.push(format!("member_roles_changed:{channel_id}:{user_id}"));
    }
}
