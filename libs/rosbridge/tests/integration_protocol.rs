//! Integration tests for topics, publishing and service calls
//!
//! Wire traffic is inspected on the broker side of in-memory sockets; the
//! last test runs the same operations over a real WebSocket.

mod common;

use common::{client_with, settle, MockPeer, MockTransport, MockWsServer, StatusLog};
use parking_lot::Mutex;
use rosbridge::{BridgeClient, BridgeError, ConnectionState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn connected(transport: &MockTransport, client: &BridgeClient) -> MockPeer {
    let mut log = StatusLog::attach(client);
    client.connect();
    let peer = transport.next_peer().await;
    log.wait_for(ConnectionState::Connected).await;
    log.detach();
    peer
}

fn recorder(
    log: &Arc<Mutex<Vec<String>>>,
    name: &'static str,
) -> impl FnMut(&Value) -> rosbridge::Result<()> + Send + 'static {
    let log = Arc::clone(log);
    move |msg: &Value| -> rosbridge::Result<()> {
        log.lock().push(format!("{}:{}", name, msg["data"]));
        Ok(())
    }
}

#[tokio::test]
async fn test_consumers_share_one_wire_subscription() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = client.subscribe("/chatter", "std_msgs/String", recorder(&log, "first"));
    let second = client.subscribe("/chatter", "std_msgs/String", recorder(&log, "second"));

    assert_eq!(
        peer.recv_json().await,
        json!({"op": "subscribe", "topic": "/chatter", "type": "std_msgs/String"})
    );
    settle().await;
    assert!(peer.try_recv_json().is_none(), "second consumer must not resubscribe");

    peer.publish("/chatter", json!({"data": "hi"}));
    settle().await;
    assert_eq!(*log.lock(), vec!["first:\"hi\"", "second:\"hi\""]);

    first.unsubscribe();
    settle().await;
    assert!(peer.try_recv_json().is_none(), "topic still has a consumer");

    client.unsubscribe(second);
    assert_eq!(
        peer.recv_json().await,
        json!({"op": "unsubscribe", "topic": "/chatter"})
    );

    peer.publish("/chatter", json!({"data": "late"}));
    settle().await;
    assert_eq!(log.lock().len(), 2);
    client.shutdown().await;
}

#[tokio::test]
async fn test_messages_for_other_topics_are_not_delivered() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let peer = connected(&transport, &client).await;

    let (_handle, rx) = client.subscribe_channel("/joint_states", "sensor_msgs/JointState");
    peer.publish("/other", json!({"data": 1}));
    peer.publish("/joint_states", json!({"data": 2}));
    settle().await;

    let received: Vec<Value> = rx.try_iter().collect();
    assert_eq!(received, vec![json!({"data": 2})]);
    client.shutdown().await;
}

#[tokio::test]
async fn test_failing_consumer_does_not_stop_delivery() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let peer = connected(&transport, &client).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    let _bad = client.subscribe("/t", "t", |_: &Value| -> rosbridge::Result<()> {
        Err(BridgeError::Protocol("cannot parse".into()))
    });
    let _good = client.subscribe("/t", "t", recorder(&log, "good"));

    peer.publish("/t", json!({"data": "x"}));
    settle().await;
    assert_eq!(*log.lock(), vec!["good:\"x\""]);
    client.shutdown().await;
}

#[tokio::test]
async fn test_subscription_made_while_disconnected_is_not_sent_on_connect() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let _handle = client.subscribe("/chatter", "std_msgs/String", |_: &Value| -> rosbridge::Result<()> {
        Ok(())
    });

    let mut peer = connected(&transport, &client).await;
    settle().await;
    assert!(peer.try_recv_json().is_none());
    client.shutdown().await;
}

#[tokio::test]
async fn test_resubscribe_on_reconnect_restores_wire_subscriptions() {
    let transport = MockTransport::new();
    let client = BridgeClient::builder()
        .url("ws://bridge.test:9090")
        .transport(transport.clone())
        .resubscribe_on_reconnect(true)
        .build()
        .unwrap();
    let (_a, _) = client.subscribe_channel("/b_topic", "std_msgs/String");
    let (_b, _) = client.subscribe_channel("/a_topic", "std_msgs/Int32");
    let (_c, _) = client.subscribe_channel("/a_topic", "std_msgs/Int32");

    let mut peer = connected(&transport, &client).await;
    assert_eq!(
        peer.recv_json().await,
        json!({"op": "subscribe", "topic": "/a_topic", "type": "std_msgs/Int32"})
    );
    assert_eq!(
        peer.recv_json().await,
        json!({"op": "subscribe", "topic": "/b_topic", "type": "std_msgs/String"})
    );
    settle().await;
    assert!(peer.try_recv_json().is_none());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_consumer_registered_before_connect_receives_across_reconnects() {
    let transport = MockTransport::new();
    let client = BridgeClient::builder()
        .url("ws://bridge.test:9090")
        .transport(transport.clone())
        .auto_reconnect(true)
        .resubscribe_on_reconnect(true)
        .build()
        .unwrap();
    let (_handle, rx) = client.subscribe_channel("/hardware_status", "std_msgs/String");
    let subscribe = json!({"op": "subscribe", "topic": "/hardware_status", "type": "std_msgs/String"});

    let mut peer = connected(&transport, &client).await;
    assert_eq!(peer.recv_json().await, subscribe);
    peer.publish("/hardware_status", json!({"data": "first"}));
    settle().await;
    assert_eq!(rx.try_recv().unwrap(), json!({"data": "first"}));

    peer.close();
    let mut peer = transport.next_peer().await;
    assert_eq!(peer.recv_json().await, subscribe);
    peer.publish("/hardware_status", json!({"data": "second"}));
    settle().await;
    assert_eq!(rx.try_recv().unwrap(), json!({"data": "second"}));

    client.shutdown().await;
}

#[tokio::test]
async fn test_publish_frame() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    client.publish("/joint_commands", "sensor_msgs/JointState", json!({"position": [0.5]}));
    assert_eq!(
        peer.recv_json().await,
        json!({
            "op": "publish",
            "topic": "/joint_commands",
            "type": "sensor_msgs/JointState",
            "msg": {"position": [0.5]}
        })
    );
    assert_eq!(client.metrics().messages_sent, 1);
    client.shutdown().await;
}

#[tokio::test]
async fn test_publish_while_disconnected_is_dropped() {
    let transport = MockTransport::new();
    let client = client_with(&transport);

    client.publish("/joint_commands", "sensor_msgs/JointState", json!({}));
    settle().await;
    assert_eq!(client.metrics().publishes_dropped, 1);

    let mut peer = connected(&transport, &client).await;
    settle().await;
    assert!(peer.try_recv_json().is_none(), "dropped publish must not be queued");
    client.shutdown().await;
}

#[tokio::test]
async fn test_service_call_resolves_with_response() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    let call = client.call_service("/add_two_ints", "AddTwoInts", json!({"a": 1, "b": 2}));
    let request = peer.recv_json().await;
    assert_eq!(request["op"], "call_service");
    assert_eq!(request["service"], "/add_two_ints");
    assert_eq!(request["type"], "AddTwoInts");
    assert_eq!(request["args"], json!({"a": 1, "b": 2}));
    let id = request["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("service_call_"));

    peer.respond(&id, json!({"sum": 3}));
    assert_eq!(call.await.unwrap(), json!({"sum": 3}));
    client.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated_by_id() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    let first = client.call_service("/svc", "t", json!({"n": 1}));
    let second = client.call_service("/svc", "t", json!({"n": 2}));
    let first_id = peer.recv_json().await["id"].as_str().unwrap().to_string();
    let second_id = peer.recv_json().await["id"].as_str().unwrap().to_string();
    assert_ne!(first_id, second_id);

    // Answered out of order
    peer.respond(&second_id, json!("two"));
    peer.respond(&first_id, json!("one"));
    assert_eq!(first.await.unwrap(), json!("one"));
    assert_eq!(second.await.unwrap(), json!("two"));
    client.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_and_unknown_responses_are_ignored() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    let call = client.call_service("/svc", "t", json!({}));
    let id = peer.recv_json().await["id"].as_str().unwrap().to_string();
    peer.respond("service_call_0_0_00000000", json!("stray"));
    peer.respond(&id, json!("first"));
    peer.respond(&id, json!("second"));

    assert_eq!(call.await.unwrap(), json!("first"));
    settle().await;
    assert_eq!(client.metrics().frames_discarded, 0);
    assert!(client.is_connected());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_service_call_times_out_and_late_reply_is_ignored() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    let call = client.call_service_with_timeout("/slow", "t", json!({}), Duration::from_millis(250));
    let id = peer.recv_json().await["id"].as_str().unwrap().to_string();

    let err = call.await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)), "{}", err);
    assert_eq!(client.metrics().calls_timed_out, 1);

    peer.respond(&id, json!("too late"));
    settle().await;
    assert!(client.is_connected());
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_call_while_disconnected_times_out() {
    let transport = MockTransport::new();
    let client = BridgeClient::builder()
        .url("ws://bridge.test:9090")
        .transport(transport.clone())
        .call_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let started = tokio::time::Instant::now();
    let err = client.call_service("/svc", "t", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert!(started.elapsed() >= Duration::from_secs(5));
    client.shutdown().await;
}

#[tokio::test]
async fn test_unbounded_call_timeout_keeps_client_alive() {
    let transport = MockTransport::new();
    let client = client_with(&transport);

    // Registered while disconnected with a deadline that cannot be represented
    let stranded = client.call_service_with_timeout("/svc", "t", json!({}), Duration::MAX);
    settle().await;

    let mut peer = connected(&transport, &client).await;
    assert_eq!(transport.open_count(), 1);

    let call = client.call_service_with_timeout("/svc", "t", json!({}), Duration::MAX);
    let id = peer.recv_json().await["id"].as_str().unwrap().to_string();
    peer.respond(&id, json!("answered"));
    assert_eq!(call.await.unwrap(), json!("answered"));

    client.disconnect();
    assert!(matches!(stranded.await, Err(BridgeError::ConnectionLost(_))));
    client.shutdown().await;
}

#[tokio::test]
async fn test_pending_calls_fail_when_connection_closes() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    let first = client.call_service("/svc", "t", json!({}));
    let second = client.call_service("/svc", "t", json!({}));
    peer.recv_json().await;
    peer.recv_json().await;

    peer.close();
    assert!(matches!(first.await, Err(BridgeError::ConnectionLost(_))));
    assert!(matches!(second.await, Err(BridgeError::ConnectionLost(_))));
    client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_fails_pending_calls() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut peer = connected(&transport, &client).await;

    let call = client.call_service("/svc", "t", json!({}));
    peer.recv_json().await;
    client.disconnect();

    assert!(matches!(call.await, Err(BridgeError::ConnectionLost(_))));
    client.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frames_are_discarded() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let peer = connected(&transport, &client).await;
    let (_handle, rx) = client.subscribe_channel("/t", "t");

    peer.send_text("not json");
    peer.send_text("[1, 2, 3]");
    peer.send_binary(vec![0xde, 0xad]);
    peer.send_json(json!({"op": "status", "level": "error", "msg": "unknown op"}));
    peer.send_json(json!({"op": "service_response", "id": 42, "values": {}}));
    peer.publish("/t", json!({"data": "still alive"}));
    settle().await;

    assert_eq!(client.metrics().frames_discarded, 5);
    assert_eq!(client.metrics().messages_received, 6);
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![json!({"data": "still alive"})]);
    assert!(client.is_connected());
    client.shutdown().await;
}

#[tokio::test]
async fn test_events_from_replaced_socket_are_ignored() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let old = connected(&transport, &client).await;
    let (_handle, rx) = client.subscribe_channel("/t", "t");

    client.disconnect();
    let new = connected(&transport, &client).await;
    let mut log = StatusLog::attach(&client);
    assert_eq!(log.next_state().await, ConnectionState::Connected);

    old.publish("/t", json!({"from": "old"}));
    old.close();
    new.publish("/t", json!({"from": "new"}));
    settle().await;

    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![json!({"from": "new"})]);
    assert!(log.drain().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn test_end_to_end_over_websocket() {
    let server = MockWsServer::start().await;
    let client = BridgeClient::builder().url(server.ws_url()).build().unwrap();
    let mut log = StatusLog::attach(&client);

    client.connect();
    log.wait_for(ConnectionState::Connected).await;

    let (handle, rx) = client.subscribe_channel("/chatter", "std_msgs/String");
    let received = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, json!({"data": "hello"}));
    handle.unsubscribe();

    let sum = client
        .call_service("/add_two_ints", "AddTwoInts", json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    assert_eq!(sum, json!({"a": 2, "b": 3}));

    server.shutdown();
    let status = log.next_state().await;
    assert!(
        matches!(status, ConnectionState::Disconnected | ConnectionState::Error),
        "unexpected status {}",
        status
    );
    client.shutdown().await;
}
