//! Listener registrations across connection loss and member restarts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client_config, init_tracing, wait_until, MockCluster, SILENT_TOPIC};
use hazelcast_client::{ClientEvent, HazelcastClient, RoutingMode, TopicListenerCodec};
use hazelcast_core::protocol::codecs::topic::{TopicAddMessageListener, TopicRemoveMessageListener};
use hazelcast_core::protocol::Operation;
use hazelcast_core::HazelcastError;
use tokio::sync::mpsc;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);
const TOPIC: &str = "news";

async fn subscribe(
    client: &HazelcastClient,
    topic: &str,
) -> (Uuid, mpsc::UnboundedReceiver<ClientEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = client
        .register_listener(Arc::new(TopicListenerCodec::new(topic)), move |event: ClientEvent| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();
    (id, rx)
}

async fn next_item(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<u8> {
    match tokio::time::timeout(WAIT, events.recv()).await {
        Ok(Some(ClientEvent::TopicMessage(payload))) => payload.item.as_bytes().to_vec(),
        other => panic!("expected a topic message, got {:?}", other),
    }
}

async fn installations(client: &HazelcastClient, id: Uuid) -> usize {
    client
        .listener_installations(id)
        .await
        .unwrap()
        .map_or(0, |connections| connections.len())
}

async fn wait_for_installations(client: &HazelcastClient, id: Uuid, expected: usize) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if installations(client, id).await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_events_reach_handler() {
    init_tracing();
    let cluster = MockCluster::start("dev", 1).await;
    let config = client_config(&cluster, RoutingMode::SingleMember).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();

    let (id, mut events) = subscribe(&client, TOPIC).await;
    assert_eq!(installations(&client, id).await, 1);
    assert_eq!(cluster.subscription_count(0, TOPIC), 1);

    cluster.publish(0, TOPIC, "first");
    cluster.publish(0, TOPIC, "second");
    assert_eq!(next_item(&mut events).await, b"first");
    assert_eq!(next_item(&mut events).await, b"second");

    client.shutdown().await;
}

#[tokio::test]
async fn test_registration_is_replayed_after_reconnect() {
    init_tracing();
    let cluster = MockCluster::start("dev", 1).await;
    let config = client_config(&cluster, RoutingMode::SingleMember).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    let (id, mut events) = subscribe(&client, TOPIC).await;

    cluster.drop_connections(0);
    assert!(wait_until(WAIT, || cluster.subscription_count(0, TOPIC) == 1).await);
    assert!(wait_for_installations(&client, id, 1).await);

    cluster.publish(0, TOPIC, "after reconnect");
    assert_eq!(next_item(&mut events).await, b"after reconnect");
    assert_eq!(
        cluster.request_count(0, TopicAddMessageListener::REQUEST_MESSAGE_TYPE),
        2
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_registration_survives_member_restart() {
    init_tracing();
    let cluster = MockCluster::start("dev", 1).await;
    let config = client_config(&cluster, RoutingMode::SingleMember).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    let (_, mut events) = subscribe(&client, TOPIC).await;

    cluster.kill(0).await;
    assert!(wait_until(WAIT, || client.connection_count() == 0).await);
    cluster.revive(0).await;

    assert!(wait_until(WAIT, || cluster.subscription_count(0, TOPIC) == 1).await);
    cluster.publish(0, TOPIC, "back");
    assert_eq!(next_item(&mut events).await, b"back");
    assert!(client.is_running());

    client.shutdown().await;
}

#[tokio::test]
async fn test_all_members_registration_delivers_each_message_once() {
    init_tracing();
    let cluster = MockCluster::start("dev", 3).await;
    let config = client_config(&cluster, RoutingMode::AllMembers).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    assert!(wait_until(WAIT, || client.connection_count() == 3).await);

    let (id, mut events) = subscribe(&client, TOPIC).await;
    assert!(wait_for_installations(&client, id, 3).await);
    for index in 0..3 {
        assert_eq!(cluster.subscription_count(index, TOPIC), 1);
    }

    cluster.publish(1, TOPIC, "once");
    assert_eq!(next_item(&mut events).await, b"once");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());

    client.shutdown().await;
}

#[tokio::test]
async fn test_new_member_receives_existing_registrations() {
    init_tracing();
    let cluster = MockCluster::start("dev", 2).await;
    cluster.kill(1).await;
    let config = client_config(&cluster, RoutingMode::AllMembers).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    let (id, mut events) = subscribe(&client, TOPIC).await;
    assert_eq!(installations(&client, id).await, 1);

    cluster.revive(1).await;
    assert!(wait_until(WAIT, || client.connection_count() == 2).await);
    assert!(wait_for_installations(&client, id, 2).await);
    assert_eq!(cluster.subscription_count(1, TOPIC), 1);

    cluster.publish(1, TOPIC, "joined");
    assert_eq!(next_item(&mut events).await, b"joined");

    client.shutdown().await;
}

#[tokio::test]
async fn test_deregister_removes_member_side_registration() {
    init_tracing();
    let cluster = MockCluster::start("dev", 1).await;
    let config = client_config(&cluster, RoutingMode::SingleMember).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    let (id, mut events) = subscribe(&client, TOPIC).await;

    assert!(client.deregister_listener(id).await.unwrap());
    assert!(!client.deregister_listener(id).await.unwrap());
    assert!(client.listener_installations(id).await.unwrap().is_none());
    assert!(
        wait_until(WAIT, || {
            cluster.request_count(0, TopicRemoveMessageListener::REQUEST_MESSAGE_TYPE) == 1
        })
        .await
    );
    assert_eq!(cluster.subscription_count(0, TOPIC), 0);

    cluster.publish(0, TOPIC, "ignored");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());

    // A deregistered listener is not replayed.
    cluster.drop_connections(0);
    assert!(wait_until(WAIT, || cluster.auth_count() == 2).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        cluster.request_count(0, TopicAddMessageListener::REQUEST_MESSAGE_TYPE),
        1
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_unanswered_registration_times_out_and_is_not_kept() {
    init_tracing();
    let cluster = MockCluster::start("dev", 1).await;
    let config = client_config(&cluster, RoutingMode::SingleMember)
        .invocation_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let client = HazelcastClient::new(config).await.unwrap();

    let err = client
        .register_listener(Arc::new(TopicListenerCodec::new(SILENT_TOPIC)), |_: ClientEvent| {})
        .await
        .unwrap_err();
    assert!(matches!(err, HazelcastError::Timeout(_)));

    cluster.drop_connections(0);
    assert!(wait_until(WAIT, || cluster.auth_count() == 2).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        cluster.request_count(0, TopicAddMessageListener::REQUEST_MESSAGE_TYPE),
        1
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_register_after_shutdown_is_rejected() {
    init_tracing();
    let cluster = MockCluster::start("dev", 1).await;
    let config = client_config(&cluster, RoutingMode::SingleMember).build().unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    client.shutdown().await;

    let err = client
        .register_listener(Arc::new(TopicListenerCodec::new(TOPIC)), |_: ClientEvent| {})
        .await
        .unwrap_err();
    assert!(matches!(err, HazelcastError::ClientNotActive(_)));
}

#[tokio::test]
async fn test_silent_member_does_not_hold_up_other_connections() {
    init_tracing();
    let cluster = MockCluster::start("dev", 2).await;
    let config = client_config(&cluster, RoutingMode::AllMembers)
        .invocation_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let client = HazelcastClient::new(config).await.unwrap();
    assert!(wait_until(WAIT, || client.connection_count() == 2).await);
    let (existing, _events) = subscribe(&client, TOPIC).await;
    assert!(wait_for_installations(&client, existing, 2).await);

    cluster.silence_listener_requests(0, true);
    let stalled = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .register_listener(Arc::new(TopicListenerCodec::new("orders")), |_: ClientEvent| {})
                .await
        })
    };

    // The healthy member is served while the silent one is still pending.
    assert!(
        wait_until(Duration::from_secs(1), || cluster.subscription_count(1, "orders") == 1).await
    );
    let started = tokio::time::Instant::now();
    assert_eq!(installations(&client, existing).await, 2);
    assert!(client.deregister_listener(existing).await.unwrap());
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!stalled.is_finished());

    let err = stalled.await.unwrap().unwrap_err();
    assert!(matches!(err, HazelcastError::Timeout(_)));
    assert!(wait_until(WAIT, || cluster.subscription_count(1, "orders") == 0).await);

    client.shutdown().await;
}
