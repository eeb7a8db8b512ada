//! Test doubles for the receiver engine: a scripted transport standing in for
//! the device and a host that records what the framework would have seen.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use denon_state::{
    AccessoryHost, AccessoryId, AccessoryProxy, AccessoryRegistration, ObservableField,
    ObservableUpdate, ObservableValue, Receiver, ReceiverEntry,
};
use denon_discovery::ReceiverMetadata;
use parking_lot::Mutex;
use status_client::{
    ClientError, Command, Endpoint, ReceiverTransport, Result as ClientResult, StatusReport,
    VolumeDisplay,
};

pub const IP: &str = "192.168.1.20";

/// Status report as an absolute-mode receiver would send it
pub fn report(power: bool, input: &str, raw_volume: f32, muted: bool) -> StatusReport {
    StatusReport {
        power: Some(power),
        active_input: Some(input.to_string()),
        volume_display: Some(VolumeDisplay::Absolute),
        master_volume: Some(raw_volume),
        muted: Some(muted),
    }
}

enum Scripted {
    Report(StatusReport),
    Fail,
}

#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Scripted>>,
    current: Mutex<Option<StatusReport>>,
    refused_ports: Mutex<HashSet<u16>>,
    fetch_delay: Mutex<Option<Duration>>,
    failing_commands: Mutex<HashSet<String>>,
    commands: Mutex<Vec<(Endpoint, Command)>>,
    fetched: Mutex<Vec<Endpoint>>,
    fetch_count: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every fetch with this report until told otherwise
    pub fn set_status(&self, report: StatusReport) {
        *self.current.lock() = Some(report);
    }

    /// Answer the next fetch with this report
    pub fn push_status(&self, report: StatusReport) {
        self.queue.lock().push_back(Scripted::Report(report));
    }

    /// Fail the next fetch with a transport error
    pub fn push_failure(&self) {
        self.queue.lock().push_back(Scripted::Fail);
    }

    /// Answer with the 403 sentinel on this port
    pub fn refuse_port(&self, port: u16) {
        self.refused_ports.lock().insert(port);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    /// Make commands with this code fail
    pub fn fail_command(&self, code: &str) {
        self.failing_commands.lock().insert(code.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn fetched_ports(&self) -> Vec<u16> {
        self.fetched.lock().iter().map(|endpoint| endpoint.port).collect()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().iter().map(|(_, command)| command.clone()).collect()
    }

    pub fn command_endpoints(&self) -> Vec<Endpoint> {
        self.commands.lock().iter().map(|(endpoint, _)| endpoint.clone()).collect()
    }
}

#[async_trait]
impl ReceiverTransport for ScriptedTransport {
    async fn fetch_status(&self, endpoint: &Endpoint) -> ClientResult<StatusReport> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().push(endpoint.clone());

        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.refused_ports.lock().contains(&endpoint.port) {
            return Err(ClientError::Forbidden(endpoint.to_string()));
        }

        let next = self.queue.lock().pop_front();
        match next {
            Some(Scripted::Report(report)) => Ok(report),
            Some(Scripted::Fail) => Err(ClientError::Transport("connection refused".to_string())),
            None => self
                .current
                .lock()
                .clone()
                .ok_or_else(|| ClientError::Transport("no status scripted".to_string())),
        }
    }

    async fn send_command(&self, endpoint: &Endpoint, command: &Command) -> ClientResult<()> {
        self.commands.lock().push((endpoint.clone(), command.clone()));
        if self.failing_commands.lock().contains(&command.code()) {
            return Err(ClientError::Transport("command timed out".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHost {
    registered: Mutex<Vec<AccessoryRegistration>>,
    updates: Mutex<Vec<ObservableUpdate>>,
    unregistered: Mutex<Vec<AccessoryId>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn registered(&self) -> Vec<AccessoryRegistration> {
        self.registered.lock().clone()
    }

    pub fn updates(&self) -> Vec<ObservableUpdate> {
        self.updates.lock().clone()
    }

    pub fn updates_for(&self, accessory: AccessoryId) -> Vec<(ObservableField, ObservableValue)> {
        self.updates
            .lock()
            .iter()
            .filter(|update| update.accessory == accessory)
            .map(|update| (update.field, update.value))
            .collect()
    }

    pub fn last(&self, accessory: AccessoryId, field: ObservableField) -> Option<ObservableValue> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|update| update.accessory == accessory && update.field == field)
            .map(|update| update.value)
    }

    pub fn clear_updates(&self) {
        self.updates.lock().clear();
    }
}

impl AccessoryHost for RecordingHost {
    fn register_accessory(&self, registration: &AccessoryRegistration) {
        self.registered.lock().push(registration.clone());
    }

    fn update_observable(
        &self,
        accessory: &AccessoryId,
        field: ObservableField,
        value: ObservableValue,
    ) {
        self.updates.lock().push(ObservableUpdate {
            accessory: *accessory,
            field,
            value,
        });
    }

    fn unregister_accessory(&self, accessory: &AccessoryId) {
        self.unregistered.lock().push(*accessory);
    }
}

pub fn entry(json: &str) -> ReceiverEntry {
    serde_json::from_str(json).unwrap()
}

pub fn metadata() -> ReceiverMetadata {
    ReceiverMetadata {
        manufacturer: "Denon".to_string(),
        model_name: "AVR-X2700H".to_string(),
        serial_number: "SN1".to_string(),
        firmware_revision: "1.0".to_string(),
    }
}

/// A receiver on port 8080 wired to the given doubles
pub fn receiver(transport: &Arc<ScriptedTransport>, host: &Arc<RecordingHost>) -> Arc<Receiver> {
    Arc::new(Receiver::new(
        Endpoint::new(IP, 8080),
        metadata(),
        Arc::clone(transport) as Arc<dyn ReceiverTransport>,
        Arc::clone(host) as Arc<dyn AccessoryHost>,
        3,
    ))
}

/// Attach a proxy built from a JSON entry; returns its handle and accessory id
pub fn attach(receiver: &Receiver, json: &str) -> (denon_state::ProxyHandle, AccessoryId) {
    let accessory = AccessoryId::new_v4();
    let handle = receiver.attach(AccessoryProxy::from_entry(&entry(json), accessory));
    (handle, accessory)
}
