use std::sync::Arc;

use parley_server::auth::AuthManager;
use parley_server::config::Config;
use parley_server::context::AppContext;
use parley_server::error::AppError;
use parley_server::models::{ConversationKind, UserLite};
use parley_server::store::memory::MemoryStore;
use parley_server::store::ChatStore;
use uuid::Uuid;

fn test_context() -> Arc<AppContext> {
    let config = Arc::new(Config::for_tests());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(AuthManager::new(&config).expect("auth manager"));
    Arc::new(AppContext::new(store, auth, config))
}

async fn seed_user(ctx: &AppContext, username: &str) -> UserLite {
    ctx.store.create_user(username).await.expect("create user")
}

#[tokio::test]
async fn direct_conversation_rejects_self_target() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;

    let err = ctx
        .registry
        .get_or_create_direct(alice.id, alice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn direct_conversation_requires_existing_user() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;

    let err = ctx
        .registry
        .get_or_create_direct(alice.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn direct_conversation_is_deduplicated_per_pair() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;

    let (first, created) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(first.conversation.kind, ConversationKind::Direct);
    assert_eq!(first.participants.len(), 2);

    // Same pair, either direction, reuses the row
    let (again, created) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again.conversation.id, first.conversation.id);

    let (reversed, created) = ctx
        .registry
        .get_or_create_direct(bob.id, alice.id)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(reversed.conversation.id, first.conversation.id);
}

#[tokio::test]
async fn group_with_same_members_never_matches_direct_lookup() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;

    let group = ctx
        .registry
        .create_group(alice.id, Some("pair group"), &[bob.id])
        .await
        .unwrap();
    assert_eq!(group.conversation.kind, ConversationKind::Group);

    let (direct, created) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();
    assert!(created, "group must not satisfy the direct lookup");
    assert_ne!(direct.conversation.id, group.conversation.id);
}

#[tokio::test]
async fn concurrent_direct_creation_has_single_winner() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let ctx = ctx.clone();
        // Alternate argument order across callers
        let (a, b) = if i % 2 == 0 {
            (alice.id, bob.id)
        } else {
            (bob.id, alice.id)
        };
        tasks.push(tokio::spawn(async move {
            ctx.registry.get_or_create_direct(a, b).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    let mut created_count = 0;
    for task in tasks {
        let (summary, created) = task.await.unwrap();
        ids.push(summary.conversation.id);
        if created {
            created_count += 1;
        }
    }

    assert_eq!(created_count, 1, "exactly one caller observes created=true");
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[tokio::test]
async fn unread_count_tracks_read_cursor() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;

    let (conv, _) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();
    let conv_id = conv.conversation.id;

    ctx.messages
        .send(conv_id, alice.id, "hello", None)
        .await
        .unwrap();

    // Own messages never count as unread
    assert_eq!(ctx.registry.unread_count(conv_id, alice.id).await.unwrap(), 0);
    assert_eq!(ctx.registry.unread_count(conv_id, bob.id).await.unwrap(), 1);

    ctx.registry.mark_read(conv_id, bob.id).await.unwrap();
    assert_eq!(ctx.registry.unread_count(conv_id, bob.id).await.unwrap(), 0);

    // Stays zero until someone else posts again
    ctx.messages
        .send(conv_id, bob.id, "hi back", None)
        .await
        .unwrap();
    assert_eq!(ctx.registry.unread_count(conv_id, bob.id).await.unwrap(), 0);
    assert_eq!(ctx.registry.unread_count(conv_id, alice.id).await.unwrap(), 1);
}

#[tokio::test]
async fn mark_read_is_idempotent_and_monotonic() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;

    let (conv, _) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();
    let conv_id = conv.conversation.id;

    ctx.messages
        .send(conv_id, alice.id, "ping", None)
        .await
        .unwrap();

    let first = ctx.registry.mark_read(conv_id, bob.id).await.unwrap();
    let second = ctx.registry.mark_read(conv_id, bob.id).await.unwrap();
    assert!(second >= first, "cursor never regresses");
    assert_eq!(ctx.registry.unread_count(conv_id, bob.id).await.unwrap(), 0);

    // A stale writer with an earlier clock cannot pull the cursor back
    let stale = second - chrono::Duration::hours(1);
    let stored = ctx
        .store
        .advance_last_read(conv_id, bob.id, stale)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, second);
}

#[tokio::test]
async fn cursor_operations_require_membership() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let mallory = seed_user(&ctx, "mallory").await;

    let (conv, _) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();

    let err = ctx
        .registry
        .mark_read(conv.conversation.id, mallory.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    let err = ctx
        .registry
        .unread_count(conv.conversation.id, mallory.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
}

#[tokio::test]
async fn listing_orders_by_activity_then_id() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let carol = seed_user(&ctx, "carol").await;
    let dave = seed_user(&ctx, "dave").await;

    let (with_bob, _) = ctx
        .registry
        .get_or_create_direct(alice.id, bob.id)
        .await
        .unwrap();
    let (with_carol, _) = ctx
        .registry
        .get_or_create_direct(alice.id, carol.id)
        .await
        .unwrap();
    let group = ctx
        .registry
        .create_group(alice.id, Some("everyone"), &[bob.id, carol.id, dave.id])
        .await
        .unwrap();

    // No messages anywhere: newest conversation first
    let listed = ctx.registry.list_for_user(alice.id).await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|s| s.conversation.id).collect();
    assert_eq!(
        ids,
        vec![
            group.conversation.id,
            with_carol.conversation.id,
            with_bob.conversation.id
        ]
    );

    // Activity moves a conversation to the front
    ctx.messages
        .send(with_bob.conversation.id, bob.id, "hey", None)
        .await
        .unwrap();
    let listed = ctx.registry.list_for_user(alice.id).await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|s| s.conversation.id).collect();
    assert_eq!(
        ids,
        vec![
            with_bob.conversation.id,
            group.conversation.id,
            with_carol.conversation.id
        ]
    );

    // Summaries carry the latest message and the viewer's unread count
    let front = &listed[0];
    assert_eq!(
        front.last_message.as_ref().map(|m| m.content.as_str()),
        Some("hey")
    );
    assert_eq!(front.unread_count, 1);
}

#[tokio::test]
async fn group_creation_dedupes_and_flags_creator_admin() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;

    let group = ctx
        .registry
        .create_group(alice.id, Some("team"), &[bob.id, bob.id, alice.id])
        .await
        .unwrap();

    assert_eq!(group.participants.len(), 2);
    let creator = group
        .participants
        .iter()
        .find(|p| p.user.id == alice.id)
        .unwrap();
    assert!(creator.is_admin);
    let member = group
        .participants
        .iter()
        .find(|p| p.user.id == bob.id)
        .unwrap();
    assert!(!member.is_admin);

    // A second identical call creates a distinct group
    let second = ctx
        .registry
        .create_group(alice.id, Some("team"), &[bob.id])
        .await
        .unwrap();
    assert_ne!(second.conversation.id, group.conversation.id);
}

#[tokio::test]
async fn group_creation_validates_members() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;

    let err = ctx
        .registry
        .create_group(alice.id, None, &[alice.id])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = ctx
        .registry
        .create_group(alice.id, None, &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
