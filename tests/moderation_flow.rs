//! Integration tests for the permission moderation engine: list shape,
//! scheme materialization and retirement, and the ancestor-scope rules.

mod common;

use chanwarden::engine::ChannelCreate;
use chanwarden::model::{
    Channel, ChannelType, ModeratedPermission, ModerationEntry, ModerationPatch, RolePatchTarget,
    SchemeScope, permissions,
};
use chanwarden::{Actor, ChannelStore, EngineError};
use common::{ALICE, TEAM_ID};

async fn channel(h: &common::Harness, name: &str, channel_type: ChannelType) -> Channel {
    h.engine
        .create_channel(
            &Actor::user(ALICE),
            ChannelCreate {
                team_id: TEAM_ID.to_string(),
                name: name.to_string(),
                display_name: name.to_string(),
                channel_type,
            },
        )
        .await
        .expect("create channel")
}

fn entry(list: &[ModerationEntry], permission: ModeratedPermission) -> &ModerationEntry {
    list.iter()
        .find(|e| e.permission == permission)
        .expect("moderation entry present")
}

fn member_patch(permission: ModeratedPermission, granted: bool) -> ModerationPatch {
    ModerationPatch {
        permission,
        roles: RolePatchTarget {
            guests: None,
            members: Some(granted),
        },
    }
}

#[tokio::test]
async fn default_list_is_fully_granted() {
    let h = common::setup().await;
    let c = channel(&h, "fresh", ChannelType::Open).await;

    let admin = Actor::system_admin(ALICE);
    let list = h.engine.channel_moderations(&admin, &c.id).await.unwrap();

    assert_eq!(list.len(), 4);
    for entry in &list {
        if entry.permission == ModeratedPermission::ManageMembers {
            assert!(entry.guests.is_none());
        } else {
            let guests = entry.guests.expect("guest dimension");
            assert!(guests.value);
            assert!(guests.enabled);
        }
        assert!(entry.members.value);
        assert!(entry.members.enabled);
    }
}

#[tokio::test]
async fn moderations_require_the_privileged_path() {
    let h = common::setup().await;
    let c = channel(&h, "locked", ChannelType::Open).await;

    let err = h
        .engine
        .channel_moderations(&Actor::user(ALICE), &c.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn permission_missing_from_every_scope_reads_disabled() {
    let h = common::setup().await;
    let c = channel(&h, "teamed", ChannelType::Open).await;

    let scheme = common::make_scheme(&h.store, SchemeScope::Team, "ts").await;
    common::assign_team_scheme(&h.store, TEAM_ID, &scheme.id).await;
    common::remove_permission_from_role(&h.store, "ts_guest", permissions::CREATE_POST).await;

    let list = h
        .engine
        .channel_moderations(&Actor::system_admin(ALICE), &c.id)
        .await
        .unwrap();
    let create_post = entry(&list, ModeratedPermission::CreatePost);
    let guests = create_post.guests.unwrap();
    assert!(!guests.value);
    assert!(!guests.enabled);
    assert!(create_post.members.value);
    assert!(create_post.members.enabled);
}

#[tokio::test]
async fn permission_missing_only_from_channel_scope_reads_enabled() {
    let h = common::setup().await;
    let c = channel(&h, "channeled", ChannelType::Open).await;

    // The channel scheme drops guest create_post, but the ancestor (system
    // defaults) still offers it: not granted, but patchable.
    let scheme = common::make_scheme(&h.store, SchemeScope::Channel, "cs").await;
    common::assign_channel_scheme(&h.store, &c.id, &scheme.id).await;
    common::remove_permission_from_role(&h.store, "cs_guest", permissions::CREATE_POST).await;

    let list = h
        .engine
        .channel_moderations(&Actor::system_admin(ALICE), &c.id)
        .await
        .unwrap();
    let create_post = entry(&list, ModeratedPermission::CreatePost);
    let guests = create_post.guests.unwrap();
    assert!(!guests.value);
    assert!(guests.enabled);
}

#[tokio::test]
async fn manage_members_value_depends_on_privacy() {
    let h = common::setup().await;
    let open = channel(&h, "open-chan", ChannelType::Open).await;
    let private = channel(&h, "private-chan", ChannelType::Private).await;

    let scheme = common::make_scheme(&h.store, SchemeScope::Team, "ts").await;
    common::assign_team_scheme(&h.store, TEAM_ID, &scheme.id).await;
    common::remove_permission_from_role(
        &h.store,
        "ts_user",
        permissions::MANAGE_PUBLIC_CHANNEL_MEMBERS,
    )
    .await;

    let admin = Actor::system_admin(ALICE);
    let open_list = h.engine.channel_moderations(&admin, &open.id).await.unwrap();
    assert!(!entry(&open_list, ModeratedPermission::ManageMembers).members.value);

    let private_list = h.engine.channel_moderations(&admin, &private.id).await.unwrap();
    assert!(entry(&private_list, ModeratedPermission::ManageMembers).members.value);
}

#[tokio::test]
async fn blank_guest_role_on_team_scheme_is_tolerated() {
    let h = common::setup().await;
    let c = channel(&h, "guestless", ChannelType::Open).await;

    let mut scheme = common::make_scheme(&h.store, SchemeScope::Team, "ts").await;
    scheme.default_channel_guest_role = String::new();
    h.store.save_scheme(&scheme).await.unwrap();
    common::assign_team_scheme(&h.store, TEAM_ID, &scheme.id).await;

    let list = h
        .engine
        .channel_moderations(&Actor::system_admin(ALICE), &c.id)
        .await
        .unwrap();
    assert_eq!(list.len(), 4);
    for entry in &list {
        if let Some(guests) = entry.guests {
            assert!(!guests.value);
            assert!(!guests.enabled);
        }
        assert!(entry.members.value);
    }
}

#[tokio::test]
async fn patch_materializes_scheme_and_is_idempotent() {
    let h = common::setup().await;
    let c = channel(&h, "patched", ChannelType::Open).await;
    let admin = Actor::system_admin(ALICE);

    let patch = [member_patch(ModeratedPermission::CreatePost, false)];
    let list = h.engine.patch_moderations(&admin, &c.id, &patch).await.unwrap();

    let create_post = entry(&list, ModeratedPermission::CreatePost);
    assert!(!create_post.members.value);
    assert!(create_post.members.enabled);
    let guests = create_post.guests.unwrap();
    assert!(guests.value);

    let after = h.store.get_channel(&c.id).await.unwrap().unwrap();
    let scheme_id = after.scheme_id.clone().expect("scheme materialized");

    // Same patch again: same list, same scheme, no second clone.
    let list_again = h.engine.patch_moderations(&admin, &c.id, &patch).await.unwrap();
    assert_eq!(list_again, list);
    let after_again = h.store.get_channel(&c.id).await.unwrap().unwrap();
    assert_eq!(after_again.scheme_id.as_deref(), Some(scheme_id.as_str()));
}

#[tokio::test]
async fn reverting_patches_retires_the_scheme() {
    let h = common::setup().await;
    let c = channel(&h, "reverted", ChannelType::Open).await;
    let admin = Actor::system_admin(ALICE);

    let deny = [member_patch(ModeratedPermission::CreatePost, false)];
    h.engine.patch_moderations(&admin, &c.id, &deny).await.unwrap();
    let scheme_id = h
        .store
        .get_channel(&c.id)
        .await
        .unwrap()
        .unwrap()
        .scheme_id
        .expect("scheme materialized");

    let allow = [member_patch(ModeratedPermission::CreatePost, true)];
    let list = h.engine.patch_moderations(&admin, &c.id, &allow).await.unwrap();
    for entry in &list {
        assert!(entry.members.value);
    }

    let after = h.store.get_channel(&c.id).await.unwrap().unwrap();
    assert_eq!(after.scheme_id, None);

    // Soft-deleted, not gone.
    let scheme = h.store.get_scheme(&scheme_id).await.unwrap().unwrap();
    assert_ne!(scheme.delete_at, 0);
}

#[tokio::test]
async fn empty_patch_on_clean_channel_creates_nothing() {
    let h = common::setup().await;
    let c = channel(&h, "untouched", ChannelType::Open).await;
    let admin = Actor::system_admin(ALICE);

    let list = h.engine.patch_moderations(&admin, &c.id, &[]).await.unwrap();
    assert_eq!(list.len(), 4);
    let after = h.store.get_channel(&c.id).await.unwrap().unwrap();
    assert_eq!(after.scheme_id, None);
}

#[tokio::test]
async fn cannot_grant_beyond_the_higher_scope() {
    let h = common::setup().await;
    let c = channel(&h, "capped", ChannelType::Open).await;

    let scheme = common::make_scheme(&h.store, SchemeScope::Team, "ts").await;
    common::assign_team_scheme(&h.store, TEAM_ID, &scheme.id).await;
    common::remove_permission_from_role(&h.store, "ts_guest", permissions::CREATE_POST).await;

    let patch = [ModerationPatch {
        permission: ModeratedPermission::CreatePost,
        roles: RolePatchTarget {
            guests: Some(true),
            members: None,
        },
    }];
    let err = h
        .engine
        .patch_moderations(&Actor::system_admin(ALICE), &c.id, &patch)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ModerationNotEnabled(_)));
}

#[tokio::test]
async fn patch_applies_to_the_current_clone_under_contention() {
    let h = std::sync::Arc::new(common::setup().await);
    let c = channel(&h, "contended", ChannelType::Open).await;
    let admin = Actor::system_admin(ALICE);

    // Two concurrent patches on the same channel: serialization means both
    // land on one scheme, never on a half-clone or two rival clones.
    let h1 = h.clone();
    let c1 = c.id.clone();
    let a1 = admin.clone();
    let first = tokio::spawn(async move {
        let patch = [member_patch(ModeratedPermission::CreatePost, false)];
        h1.engine.patch_moderations(&a1, &c1, &patch).await
    });
    let h2 = h.clone();
    let c2 = c.id.clone();
    let a2 = admin.clone();
    let second = tokio::spawn(async move {
        let patch = [member_patch(ModeratedPermission::UseChannelMentions, false)];
        h2.engine.patch_moderations(&a2, &c2, &patch).await
    });

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let list = h.engine.channel_moderations(&admin, &c.id).await.unwrap();
    assert!(!entry(&list, ModeratedPermission::CreatePost).members.value);
    assert!(!entry(&list, ModeratedPermission::UseChannelMentions).members.value);

    let after = h.store.get_channel(&c.id).await.unwrap().unwrap();
    assert!(after.scheme_id.is_some());
}

#[tokio::test]
async fn direct_channels_cannot_be_moderated() {
    let h = common::setup().await;
    let dm = h
        .engine
        .create_direct_channel(&Actor::user(ALICE), common::BOB)
        .await
        .unwrap();

    let err = h
        .engine
        .channel_moderations(&Actor::system_admin(ALICE), &dm.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TypeInvalid { .. }));
}
