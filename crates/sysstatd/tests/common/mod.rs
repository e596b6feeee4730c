//! Shared helpers for the daemon integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysstat_core::{SensorContainer, SensorInfo, SensorObject, SensorProperty, SensorValue, Unit, ValueType};
use sysstat_protocol::DaemonMessage;
use sysstatd::provider::{ProviderContext, ProviderError, SensorProvider};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Upper bound on waiting for any single message.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// One thing the scripted provider does on its next update.
#[derive(Debug, Clone)]
pub enum Action {
    Set(String, SensorValue),
    SetMax(String, f64),
    AddObject(String, SensorObject),
    RemoveObject(String, String),
    Defer(Vec<(String, SensorValue)>),
    DeferFailure(String),
    Fail(String),
}

/// Handle for queueing actions from the test body.
#[derive(Clone, Default)]
pub struct Script {
    pending: Arc<Mutex<Vec<Action>>>,
    updates: Arc<Mutex<u64>>,
}

impl Script {
    pub fn push(&self, action: Action) {
        self.pending.lock().unwrap().push(action);
    }

    pub fn set(&self, path: &str, value: impl Into<SensorValue>) {
        self.push(Action::Set(path.to_string(), value.into()));
    }

    pub fn update_count(&self) -> u64 {
        *self.updates.lock().unwrap()
    }
}

/// Provider names in the order their `update()` ran, shared across providers.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Provider driven entirely by its [`Script`].
pub struct ScriptedProvider {
    name: String,
    containers: Vec<SensorContainer>,
    script: Script,
    calls: Option<CallLog>,
}

impl ScriptedProvider {
    pub fn new(name: &str, containers: Vec<SensorContainer>) -> (Self, Script) {
        let script = Script::default();
        let provider = Self {
            name: name.to_string(),
            containers,
            script: script.clone(),
            calls: None,
        };
        (provider, script)
    }

    /// Appends this provider's name to `log` on every update.
    pub fn with_call_log(mut self, log: &CallLog) -> Self {
        self.calls = Some(Arc::clone(log));
        self
    }
}

impl SensorProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn containers(&mut self) -> Vec<SensorContainer> {
        std::mem::take(&mut self.containers)
    }

    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        *self.script.updates.lock().unwrap() += 1;
        if let Some(calls) = &self.calls {
            calls.lock().unwrap().push(self.name.clone());
        }
        let actions = std::mem::take(&mut *self.script.pending.lock().unwrap());

        for action in actions {
            match action {
                Action::Set(path, value) => {
                    ctx.set_value(&path, value)?;
                }
                Action::SetMax(path, max) => {
                    ctx.set_max(&path, max)?;
                }
                Action::AddObject(container, object) => ctx.add_object(&container, object)?,
                Action::RemoveObject(container, object) => ctx.remove_object(&container, &object)?,
                Action::Defer(values) => {
                    ctx.defer(async move { Ok(values) });
                }
                Action::DeferFailure(reason) => {
                    ctx.defer(async move { Err(ProviderError::Deferred(reason)) });
                }
                Action::Fail(reason) => return Err(ProviderError::Failed(reason)),
            }
        }

        Ok(())
    }
}

pub fn usage_property() -> SensorProperty {
    SensorProperty::new(
        "usage",
        SensorInfo::new("Usage")
            .with_unit(Unit::Percent)
            .with_value_type(ValueType::Double),
    )
}

/// `cpu` container with `all/usage` at 0.0 and `cpu0/usage`, `cpu1/usage`.
pub fn cpu_container() -> SensorContainer {
    SensorContainer::new("cpu", "CPUs")
        .with_object(SensorObject::new("all", "All").with_property(usage_property().with_value(0.0)))
        .with_object(SensorObject::new("cpu0", "CPU 1").with_property(usage_property()))
        .with_object(SensorObject::new("cpu1", "CPU 2").with_property(usage_property()))
}

/// Receives the next message or fails after [`RECV_TIMEOUT`].
pub async fn recv(rx: &mut mpsc::UnboundedReceiver<DaemonMessage>) -> DaemonMessage {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("sink closed")
}

/// Drains everything already queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<DaemonMessage>) -> Vec<DaemonMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}
