//! Integration tests for the Unix socket server.
//!
//! These tests run the DaemonServer against a manually ticked daemon and
//! talk JSON lines over a real socket: handshake, queries, subscriptions,
//! frames and shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{cpu_container, Action, ScriptedProvider, Script};
use sysstat_core::{SensorData, SensorObject};
use sysstat_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion};
use sysstatd::daemon::{spawn_daemon, DaemonHandle, DaemonOptions};
use sysstatd::server::DaemonServer;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

/// Test server context that manages server lifecycle and cleanup.
struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    daemon: DaemonHandle,
    script: Script,
    _temp_dir: TempDir, // Keep alive for RAII cleanup
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");
        let cancel_token = CancellationToken::new();

        let daemon = spawn_daemon(DaemonOptions::manual(), cancel_token.clone());
        let (provider, script) = ScriptedProvider::new("cpu", vec![cpu_container()]);
        daemon.register_provider(Box::new(provider)).await.unwrap();

        let server = DaemonServer::new(socket_path.clone(), daemon.clone(), cancel_token.clone());
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }

        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        TestServer {
            socket_path,
            cancel_token,
            daemon,
            script,
            _temp_dir: temp_dir,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.send_raw(&json).await;
    }

    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for daemon")
            .unwrap();
        serde_json::from_str(&line).unwrap()
    }

    /// True if the server closed the connection.
    async fn is_closed(&mut self) -> bool {
        let mut line = String::new();
        matches!(
            timeout(RECV_TIMEOUT, self.reader.read_line(&mut line)).await,
            Ok(Ok(0))
        )
    }

    async fn handshake(&mut self, client_id: Option<String>) -> String {
        self.send(ClientMessage::connect(client_id)).await;

        match self.recv().await {
            DaemonMessage::Connected { client_id, .. } => client_id,
            other => panic!("Expected Connected, got {other:?}"),
        }
    }

    async fn subscribe(&mut self, paths: &[&str]) -> Vec<String> {
        self.send(ClientMessage::subscribe(paths.iter().map(|p| p.to_string()).collect()))
            .await;

        match self.recv().await {
            DaemonMessage::Subscribed { paths } => paths,
            other => panic!("Expected Subscribed, got {other:?}"),
        }
    }
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_assigns_client_id() {
    let server = TestServer::spawn().await;

    let mut named = server.connect().await;
    let id = named.handshake(Some("plasma".to_string())).await;
    assert!(id.starts_with("plasma#"));

    let mut anonymous = server.connect().await;
    let id = anonymous.handshake(None).await;
    assert!(id.starts_with("client-"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_incompatible_version_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client
        .send(ClientMessage {
            protocol_version: ProtocolVersion::new(99, 0),
            message: MessageType::Connect { client_id: None },
        })
        .await;

    assert!(matches!(client.recv().await, DaemonMessage::Rejected { .. }));
    assert!(client.is_closed().await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_first_message_must_be_connect() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send(ClientMessage::all_sensors()).await;

    assert!(matches!(client.recv().await, DaemonMessage::Error { .. }));
    assert!(client.is_closed().await);

    server.shutdown().await;
}

// ============================================================================
// Query Tests
// ============================================================================

#[tokio::test]
async fn test_queries_over_socket() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake(None).await;

    client.send(ClientMessage::all_sensors()).await;
    match client.recv().await {
        DaemonMessage::SensorInfo { sensors } => {
            assert_eq!(sensors.len(), 3);
            assert!(sensors.contains_key("cpu/cpu0/usage"));
        }
        other => panic!("Expected SensorInfo, got {other:?}"),
    }

    client
        .send(ClientMessage::sensors(vec![
            "cpu/all/usage".to_string(),
            "disk/root/free".to_string(),
        ]))
        .await;
    match client.recv().await {
        DaemonMessage::SensorInfo { sensors } => {
            assert_eq!(sensors.keys().collect::<Vec<_>>(), vec!["cpu/all/usage"]);
        }
        other => panic!("Expected SensorInfo, got {other:?}"),
    }

    client
        .send(ClientMessage::sensor_data(vec!["cpu/all/usage".to_string()]))
        .await;
    assert_eq!(
        client.recv().await,
        DaemonMessage::sensor_values(vec![SensorData::new("cpu/all/usage", 0.0)])
    );

    client.send(ClientMessage::ping(7)).await;
    assert_eq!(client.recv().await, DaemonMessage::pong(7));

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_line_keeps_connection() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake(None).await;

    client.send_raw("{not json").await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some("parse_error")),
        other => panic!("Expected Error, got {other:?}"),
    }

    client.send(ClientMessage::ping(1)).await;
    assert_eq!(client.recv().await, DaemonMessage::pong(1));

    server.shutdown().await;
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_subscription_frames_over_socket() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake(Some("plasma".to_string())).await;

    let accepted = client.subscribe(&["cpu/all/usage", "cpu/nope/usage"]).await;
    assert_eq!(accepted, vec!["cpu/all/usage".to_string()]);

    server.script.set("cpu/all/usage", 42.5);
    server.daemon.tick().await.unwrap();

    match client.recv().await {
        DaemonMessage::NewSensorData { entries, .. } => {
            assert_eq!(entries, vec![SensorData::new("cpu/all/usage", 42.5)]);
        }
        other => panic!("Expected NewSensorData, got {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_shape_changes_reach_every_client() {
    let server = TestServer::spawn().await;
    let mut subscriber = server.connect().await;
    subscriber.handshake(None).await;
    subscriber.subscribe(&["cpu/cpu1/usage"]).await;

    let mut observer = server.connect().await;
    observer.handshake(None).await;
    // Make sure the observer's peer registration has reached the daemon.
    observer.send(ClientMessage::ping(0)).await;
    assert_eq!(observer.recv().await, DaemonMessage::pong(0));

    server
        .script
        .push(Action::RemoveObject("cpu".to_string(), "cpu1".to_string()));
    server.script.push(Action::AddObject(
        "cpu".to_string(),
        SensorObject::new("cpu9", "CPU 10").with_property(common::usage_property()),
    ));
    server.daemon.tick().await.unwrap();

    for client in [&mut subscriber, &mut observer] {
        assert_eq!(
            client.recv().await,
            DaemonMessage::sensor_removed("cpu/cpu1/usage".to_string())
        );
        assert_eq!(
            client.recv().await,
            DaemonMessage::sensor_added("cpu/cpu9/usage".to_string())
        );
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_tears_down_session() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;
    client.handshake(None).await;
    client.subscribe(&["cpu/all/usage"]).await;
    assert_eq!(server.daemon.status().await.unwrap().sessions, 1);

    client.send(ClientMessage::disconnect()).await;
    assert!(client.is_closed().await);

    let mut sessions = 1;
    for _ in 0..50 {
        sessions = server.daemon.status().await.unwrap().sessions;
        if sessions == 0 {
            break;
        }
        sleep(SOCKET_POLL_INTERVAL).await;
    }
    assert_eq!(sessions, 0);

    server.shutdown().await;
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let socket_path = server.socket_path.clone();
    let mut client = server.connect().await;
    client.handshake(None).await;

    server.cancel_token.cancel();
    sleep(SHUTDOWN_GRACE_PERIOD).await;

    assert!(!socket_path.exists());
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_stale_socket_replaced() {
    let temp_dir = tempfile::tempdir().unwrap();
    let socket_path = temp_dir.path().join("nested").join("stale.sock");
    std::fs::create_dir_all(socket_path.parent().unwrap()).unwrap();
    std::fs::write(&socket_path, b"stale").unwrap();

    let cancel = CancellationToken::new();
    let daemon = spawn_daemon(DaemonOptions::manual(), cancel.clone());
    let server = DaemonServer::new(socket_path.clone(), daemon, cancel.clone());
    let task = tokio::spawn(async move { server.run().await });

    sleep(SHUTDOWN_GRACE_PERIOD).await;
    assert!(UnixStream::connect(&socket_path).await.is_ok());

    cancel.cancel();
    assert!(task.await.unwrap().is_ok());
}
