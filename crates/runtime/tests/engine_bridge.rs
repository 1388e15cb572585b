// Engine bridge integration tests
//
// Drives a Connection over in-memory pipes, playing the engine side by hand:
// handshake, queued request flush, response correlation, and replies built by
// structured listeners.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use shellbus_runtime::{
    BusConfig, Connection, EventDispatcher, LaunchState, LaunchStateMachine, PipeTransport,
    ReadyListener, Subscriber,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

struct Engine {
    read: DuplexStream,
    write: DuplexStream,
}

impl Engine {
    async fn send(&mut self, message: Value) {
        let bytes = serde_json::to_vec(&message).unwrap();
        self.write
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .await
            .unwrap();
        self.write.write_all(&bytes).await.unwrap();
        self.write.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let mut len_buf = [0u8; 4];
        self.read.read_exact(&mut len_buf).await.unwrap();
        let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        self.read.read_exact(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }
}

struct Shell {
    connection: Arc<Connection>,
    dispatcher: Arc<EventDispatcher>,
    launch: Arc<LaunchStateMachine>,
}

fn setup() -> (Shell, Engine) {
    let (engine_read, shell_write) = duplex(64 * 1024);
    let (shell_read, engine_write) = duplex(64 * 1024);

    let config = BusConfig::default();
    let launch = Arc::new(LaunchStateMachine::new());
    let (transport, message_rx) = PipeTransport::new(shell_write, shell_read);
    let connection = Arc::new(Connection::new(
        transport.into_transport_parts(message_rx),
        Arc::clone(&launch),
        &config,
    ));
    let dispatcher = Arc::new(EventDispatcher::with_config(connection.queue(), &config));

    dispatcher
        .register(
            &Subscriber::native(ReadyListener::new(Arc::clone(&launch), connection.queue())),
            &[config.handshake_event.as_str()],
        )
        .unwrap();

    (
        Shell {
            connection,
            dispatcher,
            launch,
        },
        Engine {
            read: engine_read,
            write: engine_write,
        },
    )
}

fn spawn_run(shell: &Shell) -> tokio::task::JoinHandle<shellbus_runtime::Result<()>> {
    let connection = Arc::clone(&shell.connection);
    let dispatcher = Arc::clone(&shell.dispatcher);
    tokio::spawn(async move { connection.run(dispatcher).await })
}

#[tokio::test]
async fn test_request_waits_for_handshake_then_resolves() {
    let (shell, mut engine) = setup();
    let run = spawn_run(&shell);

    let request = {
        let connection = Arc::clone(&shell.connection);
        tokio::spawn(async move {
            connection
                .request("Session:Restore", json!({"windows": 1}))
                .await
        })
    };
    while shell.connection.queue().pending_len() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(shell.launch.current(), LaunchState::Launching);

    engine.send(json!({"type": "Gecko:Ready"})).await;
    shell
        .launch
        .wait_for(LaunchState::GeckoRunning, Duration::from_secs(5))
        .await
        .unwrap();

    let sent = engine.recv().await;
    assert_eq!(sent["type"], "Session:Restore");
    assert_eq!(sent["windows"], 1);
    let guid = sent["GUID"].as_str().unwrap().to_string();

    engine
        .send(json!({"type": "Session:Restore:Return", "GUID": guid, "response": {"restored": 3}}))
        .await;

    let response = request.await.unwrap().unwrap();
    assert_eq!(response, json!({"restored": 3}));

    drop(engine);
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_structured_listener_replies_through_queue() {
    let (shell, mut engine) = setup();

    let dispatcher: Weak<EventDispatcher> = Arc::downgrade(&shell.dispatcher);
    shell
        .dispatcher
        .register(
            &Subscriber::structured(move |_: &str, message: &Value| {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    let query = message["query"].as_str().unwrap_or_default();
                    dispatcher.send_response(message, json!({"suggestions": [format!("{query}!")]}));
                }
            }),
            &["Search:Suggest"],
        )
        .unwrap();

    let run = spawn_run(&shell);
    engine.send(json!({"type": "Gecko:Ready"})).await;
    engine
        .send(json!({"type": "Search:Suggest", "GUID": "engine-9", "query": "rust"}))
        .await;

    let reply = engine.recv().await;
    assert_eq!(
        reply,
        json!({
            "type": "Search:Suggest:Return",
            "GUID": "engine-9",
            "response": {"suggestions": ["rust!"]},
        })
    );

    drop(engine);
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_closed_connection_fails_pending_requests() {
    let (shell, mut engine) = setup();
    let run = spawn_run(&shell);

    engine.send(json!({"type": "Gecko:Ready"})).await;
    let request = {
        let connection = Arc::clone(&shell.connection);
        tokio::spawn(async move { connection.request("Never:Answered", json!({})).await })
    };
    let _ = engine.recv().await;

    drop(engine);
    run.await.unwrap().unwrap();

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, shellbus_runtime::Error::ChannelClosed), "got {err:?}");
    assert_eq!(shell.connection.pending_requests(), 0);
}
