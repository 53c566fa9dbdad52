//! Integration tests for connection management
//!
//! These tests verify status transitions, endpoint handling and client
//! lifecycle against in-memory sockets.

mod common;

use common::{client_with, settle, MockTransport, StatusLog};
use rosbridge::{AtomicConnectionState, BridgeError, ConnectionState};
use serde_json::json;
use std::sync::Arc;
use std::thread;

#[tokio::test]
async fn test_connection_full_lifecycle() {
    verbose_println!("Testing full connection lifecycle...");

    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    assert_eq!(log.next_state().await, ConnectionState::Disconnected);

    client.connect();
    assert_eq!(log.next_state().await, ConnectionState::Connecting);
    let mut peer = transport.next_peer().await;
    assert_eq!(log.next_state().await, ConnectionState::Connected);
    assert!(client.is_connected());

    client.disconnect();
    assert_eq!(log.next_state().await, ConnectionState::Disconnected);
    peer.wait_closed_by_client().await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_connect_is_ignored_while_connected() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    client.connect();
    let _peer = transport.next_peer().await;
    log.wait_for(ConnectionState::Connected).await;

    client.connect();
    client.connect();
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert!(log.drain().is_empty(), "no transitions expected");
    client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_when_disconnected_emits_nothing() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    assert_eq!(log.next_state().await, ConnectionState::Disconnected);

    client.disconnect();
    settle().await;
    assert!(log.drain().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn test_peer_close_reports_disconnected() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    client.connect();
    let peer = transport.next_peer().await;
    log.wait_for(ConnectionState::Connected).await;

    peer.close();
    assert_eq!(log.next_state().await, ConnectionState::Disconnected);
    assert_eq!(client.status(), ConnectionState::Disconnected);
    client.shutdown().await;
}

#[tokio::test]
async fn test_refused_open_reports_connecting_then_error() {
    let transport = MockTransport::refusing();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    log.next_state().await;

    client.connect();
    assert_eq!(log.next_state().await, ConnectionState::Connecting);
    assert_eq!(log.next_state().await, ConnectionState::Error);
    client.shutdown().await;
}

#[tokio::test]
async fn test_set_endpoint_requires_disconnected() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    client.connect();
    let _peer = transport.next_peer().await;
    log.wait_for(ConnectionState::Connected).await;

    let err = client.set_endpoint("ws://other.test:9090").await.unwrap_err();
    assert!(matches!(err, BridgeError::InvalidState(_)), "{}", err);
    assert_eq!(client.endpoint(), "ws://bridge.test:9090");

    client.disconnect();
    client.set_endpoint("ws://other.test:9090").await.unwrap();
    assert_eq!(client.endpoint(), "ws://other.test:9090");

    client.connect();
    let _peer = transport.next_peer().await;
    assert_eq!(
        transport.opened_urls(),
        vec!["ws://bridge.test:9090", "ws://other.test:9090"]
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_set_endpoint_rejects_non_websocket_url() {
    let transport = MockTransport::new();
    let client = client_with(&transport);

    let err = client.set_endpoint("http://other.test").await.unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
    assert_eq!(client.endpoint(), "ws://bridge.test:9090");
    client.shutdown().await;
}

#[tokio::test]
async fn test_switch_endpoint_reconnects_to_new_url() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    client.connect();
    let mut first = transport.next_peer().await;
    log.wait_for(ConnectionState::Connected).await;

    client.switch_endpoint("ws://robot.test:9090").await.unwrap();
    first.wait_closed_by_client().await;
    let _second = transport.next_peer().await;

    assert_eq!(log.next_state().await, ConnectionState::Disconnected);
    assert_eq!(log.next_state().await, ConnectionState::Connecting);
    assert_eq!(log.next_state().await, ConnectionState::Connected);
    assert_eq!(client.endpoint(), "ws://robot.test:9090");
    assert_eq!(transport.opened_urls()[1], "ws://robot.test:9090");
    client.shutdown().await;
}

#[tokio::test]
async fn test_late_observer_sees_current_state() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut early = StatusLog::attach(&client);
    client.connect();
    let _peer = transport.next_peer().await;
    early.wait_for(ConnectionState::Connected).await;

    let mut late = StatusLog::attach(&client);
    assert_eq!(late.next_state().await, ConnectionState::Connected);
    client.shutdown().await;
}

#[tokio::test]
async fn test_unobserved_observer_is_not_notified() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    assert_eq!(log.next_state().await, ConnectionState::Disconnected);

    log.detach();
    client.connect();
    let _peer = transport.next_peer().await;
    settle().await;

    assert!(log.drain().is_empty());
    client.shutdown().await;
}

#[tokio::test]
async fn test_operations_after_shutdown() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let other = client.clone();
    client.shutdown().await;

    assert!(matches!(
        other.set_endpoint("ws://other.test:9090").await,
        Err(BridgeError::Shutdown)
    ));
    assert!(matches!(
        other.call_service("/svc", "t", json!({})).await,
        Err(BridgeError::ConnectionLost(_))
    ));
    other.connect();
    settle().await;
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test]
async fn test_dropping_last_handle_closes_socket() {
    let transport = MockTransport::new();
    let client = client_with(&transport);
    let mut log = StatusLog::attach(&client);
    client.connect();
    let mut peer = transport.next_peer().await;
    log.wait_for(ConnectionState::Connected).await;

    let clone = client.clone();
    drop(client);
    settle().await;
    assert!(peer.try_recv_json().is_none());
    assert!(clone.is_connected());

    drop(clone);
    peer.wait_closed_by_client().await;
}

#[test]
fn test_concurrent_state_access() {
    verbose_println!("Testing concurrent state access...");

    let state = Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected));
    let cycle = [
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Error,
        ConnectionState::Disconnected,
    ];

    let writer = {
        let state = Arc::clone(&state);
        thread::spawn(move || {
            for i in 0..10_000 {
                state.set(cycle[i % cycle.len()]);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    // Every read observes one of the four valid states
                    let current = state.get();
                    assert!(cycle.contains(&current));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(state.get(), ConnectionState::Disconnected);
}
