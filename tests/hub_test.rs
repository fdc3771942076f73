use parley_server::hub::RealtimeHub;
use parley_server::message::ServerEvent;

fn error_event(code: &str) -> ServerEvent {
    ServerEvent::Error {
        code: code.to_string(),
        message: "test".to_string(),
    }
}

#[tokio::test]
async fn publish_fans_out_to_every_group_member() {
    let hub = RealtimeHub::new(16);
    let mut first = hub.join(7).await;
    let mut second = hub.join(7).await;

    let delivered = hub.publish(7, error_event("E1")).await;
    assert_eq!(delivered, 2);

    assert!(matches!(
        first.recv().await.unwrap(),
        ServerEvent::Error { code, .. } if code == "E1"
    ));
    assert!(matches!(
        second.recv().await.unwrap(),
        ServerEvent::Error { code, .. } if code == "E1"
    ));
}

#[tokio::test]
async fn publish_without_subscribers_is_a_noop() {
    let hub = RealtimeHub::new(16);
    assert_eq!(hub.publish(1, error_event("E1")).await, 0);
}

#[tokio::test]
async fn groups_are_isolated_by_conversation() {
    let hub = RealtimeHub::new(16);
    let mut one = hub.join(1).await;
    let _two = hub.join(2).await;

    hub.publish(2, error_event("E2")).await;

    // Nothing crosses over into conversation 1's feed
    assert!(matches!(
        one.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn leaving_prunes_the_empty_group() {
    let hub = RealtimeHub::new(16);
    let feed = hub.join(5).await;
    assert_eq!(hub.group_size(5).await, 1);

    drop(feed);
    hub.leave(5).await;
    assert_eq!(hub.group_size(5).await, 0);
    assert_eq!(hub.publish(5, error_event("E1")).await, 0);
}

#[tokio::test]
async fn remaining_members_keep_the_group_alive() {
    let hub = RealtimeHub::new(16);
    let mut stays = hub.join(9).await;
    let leaves = hub.join(9).await;

    drop(leaves);
    hub.leave(9).await;

    assert_eq!(hub.group_size(9).await, 1);
    assert_eq!(hub.publish(9, error_event("E1")).await, 1);
    assert!(stays.recv().await.is_ok());
}
