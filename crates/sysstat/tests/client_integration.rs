//! End-to-end tests for `SensorClient` against an in-process daemon.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysstat_client::{ClientConfig, ClientEvent, SensorClient};
use sysstat_core::{SensorContainer, SensorData, SensorInfo, SensorObject, SensorProperty, SensorValue};
use sysstatd::daemon::{spawn_daemon, DaemonHandle, DaemonOptions};
use sysstatd::provider::{ProviderContext, ProviderError, SensorProvider};
use sysstatd::server::DaemonServer;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Values and object additions queued for the next update.
#[derive(Default)]
struct Pending {
    values: Vec<(String, SensorValue)>,
    objects: Vec<SensorObject>,
}

struct GpuProvider {
    pending: Arc<Mutex<Pending>>,
}

impl SensorProvider for GpuProvider {
    fn name(&self) -> &str {
        "gpu"
    }

    fn containers(&mut self) -> Vec<SensorContainer> {
        vec![SensorContainer::new("gpu", "GPUs").with_object(
            SensorObject::new("gpu0", "GPU 1")
                .with_property(SensorProperty::new("temperature", SensorInfo::new("Temperature"))),
        )]
    }

    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for object in pending.objects {
            ctx.add_object("gpu", object)?;
        }
        for (path, value) in pending.values {
            ctx.set_value(&path, value)?;
        }
        Ok(())
    }
}

struct Harness {
    socket_path: PathBuf,
    daemon: DaemonHandle,
    pending: Arc<Mutex<Pending>>,
    cancel: CancellationToken,
    _temp_dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let socket_path = temp_dir.path().join("client.sock");
        let cancel = CancellationToken::new();

        let daemon = spawn_daemon(DaemonOptions::manual(), cancel.clone());
        let pending = Arc::new(Mutex::new(Pending::default()));
        daemon
            .register_provider(Box::new(GpuProvider {
                pending: Arc::clone(&pending),
            }))
            .await
            .unwrap();

        let server = DaemonServer::new(socket_path.clone(), daemon.clone(), cancel.clone());
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        for _ in 0..50 {
            if socket_path.exists() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        Self {
            socket_path,
            daemon,
            pending,
            cancel,
            _temp_dir: temp_dir,
        }
    }

    async fn client(&self) -> SensorClient {
        SensorClient::connect(&ClientConfig {
            socket_path: self.socket_path.clone(),
            client_name: Some("test".to_string()),
            request_timeout: Duration::from_secs(2),
        })
        .await
        .unwrap()
    }

    fn set(&self, path: &str, value: impl Into<SensorValue>) {
        self.pending
            .lock()
            .unwrap()
            .values
            .push((path.to_string(), value.into()));
    }
}

async fn next_event(client: &mut SensorClient) -> ClientEvent {
    timeout(Duration::from_secs(2), client.next_event())
        .await
        .expect("timed out waiting for event")
        .unwrap()
        .expect("connection closed")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_and_discovery() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    assert!(client.client_id().starts_with("test#"));
    client.ping().await.unwrap();

    let sensors = client.all_sensors().await.unwrap();
    assert_eq!(sensors["gpu/gpu0/temperature"].name, "Temperature");

    let sensors = client
        .sensors(vec!["gpu/gpu0/temperature".to_string(), "gpu/gpu9/temperature".to_string()])
        .await
        .unwrap();
    assert_eq!(sensors.len(), 1);

    harness.cancel.cancel();
}

#[tokio::test]
async fn test_subscribe_and_receive_frames() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    let accepted = client
        .subscribe(vec!["gpu/gpu0/temperature".to_string()])
        .await
        .unwrap();
    assert_eq!(accepted, vec!["gpu/gpu0/temperature".to_string()]);

    harness.set("gpu/gpu0/temperature", 61.0);
    harness.daemon.tick().await.unwrap();

    match next_event(&mut client).await {
        ClientEvent::Data { entries, .. } => {
            assert_eq!(entries, vec![SensorData::new("gpu/gpu0/temperature", 61.0)]);
        }
        other => panic!("Expected Data, got {other:?}"),
    }

    let removed = client
        .unsubscribe(vec!["gpu/gpu0/temperature".to_string()])
        .await
        .unwrap();
    assert_eq!(removed.len(), 1);

    harness.cancel.cancel();
}

#[tokio::test]
async fn test_pushed_messages_buffered_during_request() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    harness.pending.lock().unwrap().objects.push(
        SensorObject::new("gpu1", "GPU 2")
            .with_property(SensorProperty::new("temperature", SensorInfo::new("Temperature"))),
    );
    harness.set("gpu/gpu1/temperature", 45.0);
    harness.daemon.tick().await.unwrap();

    // The sensor_added broadcast is already on the wire ahead of this response.
    let data = client
        .sensor_data(vec!["gpu/gpu1/temperature".to_string()])
        .await
        .unwrap();
    assert_eq!(data, vec![SensorData::new("gpu/gpu1/temperature", 45.0)]);
    assert_eq!(client.pending_events(), 1);

    assert_eq!(
        next_event(&mut client).await,
        ClientEvent::SensorAdded("gpu/gpu1/temperature".to_string())
    );

    harness.cancel.cancel();
}

#[tokio::test]
async fn test_next_event_ends_on_shutdown() {
    let harness = Harness::start().await;
    let mut client = harness.client().await;

    harness.cancel.cancel();

    let event = timeout(Duration::from_secs(2), client.next_event())
        .await
        .expect("timed out waiting for close")
        .unwrap();
    assert!(event.is_none());
}
