use std::sync::Arc;

use parley_server::auth::AuthManager;
use parley_server::config::Config;
use parley_server::context::AppContext;
use parley_server::error::AppError;
use parley_server::message::ServerEvent;
use parley_server::models::UserLite;
use parley_server::store::memory::MemoryStore;
use parley_server::store::ChatStore;

fn test_context() -> Arc<AppContext> {
    let config = Arc::new(Config::for_tests());
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(AuthManager::new(&config).expect("auth manager"));
    Arc::new(AppContext::new(store, auth, config))
}

async fn seed_user(ctx: &AppContext, username: &str) -> UserLite {
    ctx.store.create_user(username).await.expect("create user")
}

async fn seed_direct(ctx: &AppContext, a: &UserLite, b: &UserLite) -> i64 {
    let (summary, _) = ctx
        .registry
        .get_or_create_direct(a.id, b.id)
        .await
        .expect("direct conversation");
    summary.conversation.id
}

#[tokio::test]
async fn send_bumps_conversation_freshness_atomically() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let conv_id = seed_direct(&ctx, &alice, &bob).await;

    let message = ctx
        .messages
        .send(conv_id, alice.id, "hello", None)
        .await
        .unwrap();

    // Read-your-writes: the conversation reflects the send immediately
    let conversation = ctx.store.get_conversation(conv_id).await.unwrap().unwrap();
    assert_eq!(conversation.last_activity_at, Some(message.created_at));
}

#[tokio::test]
async fn send_requires_membership() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let mallory = seed_user(&ctx, "mallory").await;
    let conv_id = seed_direct(&ctx, &alice, &bob).await;

    let err = ctx
        .messages
        .send(conv_id, mallory.id, "let me in", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    let err = ctx.messages.list(conv_id, mallory.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
}

#[tokio::test]
async fn reply_parent_must_share_the_conversation() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let carol = seed_user(&ctx, "carol").await;
    let with_bob = seed_direct(&ctx, &alice, &bob).await;
    let with_carol = seed_direct(&ctx, &alice, &carol).await;

    let parent = ctx
        .messages
        .send(with_bob, alice.id, "root", None)
        .await
        .unwrap();

    let err = ctx
        .messages
        .send(with_carol, alice.id, "cross-thread reply", Some(parent.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = ctx
        .messages
        .send(with_bob, alice.id, "orphan reply", Some(parent.id + 100))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // A well-formed reply carries its parent id
    let reply = ctx
        .messages
        .send(with_bob, bob.id, "reply", Some(parent.id))
        .await
        .unwrap();
    assert_eq!(reply.parent_id, Some(parent.id));
}

#[tokio::test]
async fn listing_preserves_insertion_order() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let conv_id = seed_direct(&ctx, &alice, &bob).await;

    for i in 0..5 {
        ctx.messages
            .send(conv_id, alice.id, &format!("message {i}"), None)
            .await
            .unwrap();
    }

    let listed = ctx.messages.list(conv_id, bob.id).await.unwrap();
    let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["message 0", "message 1", "message 2", "message 3", "message 4"]
    );

    // Non-decreasing creation times, ties broken by id
    for pair in listed.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
        assert!(pair[0].id < pair[1].id);
    }
}

#[tokio::test]
async fn send_broadcasts_after_commit() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let conv_id = seed_direct(&ctx, &alice, &bob).await;

    let mut feed = ctx.hub.join(conv_id).await;

    let sent = ctx
        .messages
        .send(conv_id, alice.id, "live", None)
        .await
        .unwrap();

    let ServerEvent::MessageCreated { message } = feed.recv().await.unwrap() else {
        panic!("expected message.created event");
    };
    assert_eq!(message.id, sent.id);
    assert_eq!(message.content, "live");
    assert_eq!(message.sender.username, "alice");

    // The broadcast copy is the committed record
    let stored = ctx.store.get_message(sent.id).await.unwrap().unwrap();
    assert_eq!(stored.created_at, message.created_at);
}

#[tokio::test]
async fn oversized_content_is_rejected() {
    let ctx = test_context();
    let alice = seed_user(&ctx, "alice").await;
    let bob = seed_user(&ctx, "bob").await;
    let conv_id = seed_direct(&ctx, &alice, &bob).await;

    let oversized = "x".repeat(parley_server::config::MAX_MESSAGE_CONTENT_CHARS + 1);
    let err = ctx
        .messages
        .send(conv_id, alice.id, &oversized, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
