use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shellbus_protocol::Bundle;
use tokio::io::duplex;

use super::*;
use crate::launch_state::LaunchState;
use crate::listener::Subscriber;
use crate::transport::PipeTransport;

struct Harness {
    connection: Arc<Connection>,
    dispatcher: Arc<EventDispatcher>,
    launch: Arc<LaunchStateMachine>,
    _pipes: (tokio::io::DuplexStream, tokio::io::DuplexStream),
}

fn harness_with(config: &BusConfig, running: bool) -> Harness {
    let (engine_read, shell_write) = duplex(1024);
    let (shell_read, engine_write) = duplex(1024);

    let (transport, message_rx) = PipeTransport::new(shell_write, shell_read);
    let launch = Arc::new(LaunchStateMachine::new());
    if running {
        launch.check_and_set(LaunchState::Launching, LaunchState::GeckoRunning);
    }

    let connection = Arc::new(Connection::new(
        transport.into_transport_parts(message_rx),
        Arc::clone(&launch),
        config,
    ));
    let dispatcher = Arc::new(EventDispatcher::with_config(connection.queue(), config));

    Harness {
        connection,
        dispatcher,
        launch,
        _pipes: (engine_read, engine_write),
    }
}

fn harness() -> Harness {
    harness_with(&BusConfig::default(), true)
}

async fn wait_for_pending(connection: &Connection, count: usize) {
    while connection.pending_requests() != count {
        tokio::task::yield_now().await;
    }
}

#[test]
fn test_guids_are_unique_and_prefixed() {
    let h = harness();
    let a = h.connection.last_id.fetch_add(1, Ordering::SeqCst);
    let b = h.connection.last_id.fetch_add(1, Ordering::SeqCst);
    assert_ne!(a, b);
    assert!(format!("{GUID_PREFIX}{a}").starts_with("shell-"));
}

#[tokio::test]
async fn test_return_resolves_request() {
    let h = harness();
    let request = {
        let connection = Arc::clone(&h.connection);
        tokio::spawn(async move { connection.request("Prefs:Get", json!({"name": "a"})).await })
    };
    wait_for_pending(&h.connection, 1).await;

    h.connection.handle_inbound(
        &h.dispatcher,
        json!({"type": "Prefs:Get:Return", "GUID": "shell-0", "response": {"value": 1}}),
    );

    let value = request.await.unwrap().unwrap();
    assert_eq!(value, json!({"value": 1}));
    assert_eq!(h.connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_error_resolves_request_as_remote() {
    let h = harness();
    let request = {
        let connection = Arc::clone(&h.connection);
        tokio::spawn(async move { connection.request("Prefs:Set", json!({})).await })
    };
    wait_for_pending(&h.connection, 1).await;

    h.connection.handle_inbound(
        &h.dispatcher,
        json!({"type": "Prefs:Set:Error", "GUID": "shell-0", "response": "read-only"}),
    );

    let err = request.await.unwrap().unwrap_err();
    match &err {
        Error::Remote { event, payload } => {
            assert_eq!(event, "Prefs:Set");
            assert_eq!(payload, &json!("read-only"));
        }
        other => panic!("Expected Remote error, got {other:?}"),
    }
    assert_eq!(err.remote_payload(), Some(&json!("read-only")));
}

#[tokio::test]
async fn test_request_times_out_and_cleans_up() {
    let config = BusConfig {
        request_timeout_ms: 20,
        ..BusConfig::default()
    };
    let h = harness_with(&config, true);

    let err = h.connection.request("Never:Answered", json!({})).await.unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(h.connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_dropped_request_removes_pending_entry() {
    let h = harness();
    let outcome = tokio::time::timeout(
        Duration::from_millis(10),
        h.connection.request("Slow", json!({})),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(h.connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_while_exiting_fails_fast() {
    let h = harness();
    h.launch.mark_exiting();

    let err = h.connection.request("Late", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::EngineExiting));
    assert_eq!(h.connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_request_before_launch_is_queued() {
    let h = harness_with(&BusConfig::default(), false);
    let _request = {
        let connection = Arc::clone(&h.connection);
        tokio::spawn(async move { connection.request("Early", json!({})).await })
    };
    wait_for_pending(&h.connection, 1).await;

    assert_eq!(h.connection.queue().pending_len(), 1);
}

#[tokio::test]
async fn test_unmatched_response_is_dispatched() {
    let h = harness();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.dispatcher
        .register(
            &Subscriber::native(move |event: &str, message: &Bundle| {
                sink.lock()
                    .push((event.to_string(), message.get_str("GUID").map(str::to_string)));
            }),
            &["Search:Get:Return"],
        )
        .unwrap();

    h.connection.handle_inbound(
        &h.dispatcher,
        json!({"type": "Search:Get:Return", "GUID": "other-7", "response": null}),
    );

    assert_eq!(
        *seen.lock(),
        vec![("Search:Get:Return".to_string(), Some("other-7".to_string()))]
    );
}

#[tokio::test]
async fn test_inbound_event_is_dispatched() {
    let h = harness();
    let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    h.dispatcher
        .register(
            &Subscriber::structured(move |_: &str, message: &Value| {
                assert_eq!(message["tabID"], 4);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            &["Tab:Selected"],
        )
        .unwrap();

    h.connection
        .handle_inbound(&h.dispatcher, json!({"type": "Tab:Selected", "tabID": 4}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_twice_is_an_error() {
    let h = harness();
    let first = {
        let connection = Arc::clone(&h.connection);
        let dispatcher = Arc::clone(&h.dispatcher);
        tokio::spawn(async move { connection.run(dispatcher).await })
    };
    while h.connection.message_rx.lock().is_some() {
        tokio::task::yield_now().await;
    }

    let second = h.connection.run(Arc::clone(&h.dispatcher)).await;
    assert!(matches!(second, Err(Error::ProtocolError(_))));
    first.abort();
}
