//! Receiver aggregate
//!
//! One [`Receiver`] per physical device owns the canonical state and the
//! attached proxies. Poll ticks and user actions both go through it:
//!
//! - `serial` (async mutex) orders whole operations, including their network
//!   calls, so a user action and a poll tick never interleave their merges.
//! - `core` (sync mutex) guards state and proxies; it is never held across
//!   an await or while calling the accessory host.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use denon_discovery::ReceiverMetadata;
use parking_lot::Mutex;
use status_client::{ClientError, Endpoint, ReceiverTransport, StateDelta, VolumeDisplay};

use crate::error::{ActionError, ActionResult};
use crate::host::AccessoryHost;
use crate::model::{
    AccessoryId, ObservableField, ObservableUpdate, ObservableValue, ProxyHandle, ReceiverState,
    UserAction,
};
use crate::proxy::AccessoryProxy;

/// Result of one poll tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Status fetched and merged
    Applied(StateDelta),
    /// Skipped because a local command just updated state
    Suppressed,
    /// Skipped because the previous tick has not finished
    InFlight,
    /// Fetch or parse failed; state left as it was
    Failed,
}

struct ReceiverCore {
    state: ReceiverState,
    proxies: Vec<(ProxyHandle, AccessoryProxy)>,
    next_handle: u32,
}

/// Clears the in-flight flag when a tick ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Receiver {
    endpoint: Endpoint,
    metadata: ReceiverMetadata,
    transport: Arc<dyn ReceiverTransport>,
    host: Arc<dyn AccessoryHost>,
    serial: tokio::sync::Mutex<()>,
    core: Mutex<ReceiverCore>,
    volume_display: OnceLock<VolumeDisplay>,
    suppress_next_poll: AtomicBool,
    poll_in_flight: AtomicBool,
    consecutive_failures: AtomicU32,
    reachable: AtomicBool,
    failure_threshold: u32,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("endpoint", &self.endpoint)
            .field("metadata", &self.metadata)
            .field("reachable", &self.is_reachable())
            .finish_non_exhaustive()
    }
}

impl Receiver {
    pub fn new(
        endpoint: Endpoint,
        metadata: ReceiverMetadata,
        transport: Arc<dyn ReceiverTransport>,
        host: Arc<dyn AccessoryHost>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            endpoint,
            metadata,
            transport,
            host,
            serial: tokio::sync::Mutex::new(()),
            core: Mutex::new(ReceiverCore {
                state: ReceiverState::default(),
                proxies: Vec::new(),
                next_handle: 1,
            }),
            volume_display: OnceLock::new(),
            suppress_next_poll: AtomicBool::new(false),
            poll_in_flight: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            reachable: AtomicBool::new(true),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn metadata(&self) -> &ReceiverMetadata {
        &self.metadata
    }

    /// Snapshot of the canonical state
    pub fn state(&self) -> ReceiverState {
        self.core.lock().state.clone()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    pub fn volume_display(&self) -> Option<VolumeDisplay> {
        self.volume_display.get().copied()
    }

    /// Attach a proxy and register its accessory with the host
    pub fn attach(&self, proxy: AccessoryProxy) -> ProxyHandle {
        let registration = proxy.registration(&self.metadata);
        let handle = {
            let mut core = self.core.lock();
            let handle = ProxyHandle(core.next_handle);
            core.next_handle += 1;
            core.proxies.push((handle, proxy));
            handle
        };

        tracing::debug!(
            "Attached {} '{}' as {} to {}",
            registration.kind,
            registration.name,
            handle,
            self.endpoint
        );
        self.host.register_accessory(&registration);
        handle
    }

    /// Handles of every attached proxy, in attach order
    pub fn handles(&self) -> Vec<ProxyHandle> {
        self.core.lock().proxies.iter().map(|(handle, _)| *handle).collect()
    }

    pub fn accessory_of(&self, handle: ProxyHandle) -> Option<AccessoryId> {
        self.core
            .lock()
            .proxies
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, proxy)| proxy.accessory())
    }

    /// Non-owning links for the framework adapter, one per proxy
    pub fn links(self: &Arc<Self>) -> Vec<ProxyLink> {
        let core = self.core.lock();
        core.proxies
            .iter()
            .map(|(handle, proxy)| ProxyLink {
                receiver: Arc::downgrade(self),
                handle: *handle,
                accessory: proxy.accessory(),
            })
            .collect()
    }

    /// Current value of a proxy's attribute
    pub fn observable(
        &self,
        handle: ProxyHandle,
        field: ObservableField,
    ) -> ActionResult<Option<ObservableValue>> {
        let core = self.core.lock();
        let (_, proxy) = core
            .proxies
            .iter()
            .find(|(h, _)| *h == handle)
            .ok_or(ActionError::UnknownProxy(handle))?;
        Ok(proxy.observable(field, &core.state))
    }

    /// Merge a delta and broadcast it, skipping `origin`.
    ///
    /// Waits for any running poll tick or user action first.
    pub async fn reconcile(&self, delta: StateDelta, origin: Option<ProxyHandle>) -> usize {
        let _serial = self.serial.lock().await;
        self.apply(&delta, origin)
    }

    /// Run one poll tick
    pub async fn poll_once(&self) -> PollOutcome {
        if self.poll_in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("Poll of {} still in flight; skipping tick", self.endpoint);
            return PollOutcome::InFlight;
        }
        let _in_flight = InFlightGuard(&self.poll_in_flight);
        let _serial = self.serial.lock().await;

        if self.suppress_next_poll.swap(false, Ordering::AcqRel) {
            tracing::debug!("Skipping poll of {} after local command", self.endpoint);
            return PollOutcome::Suppressed;
        }

        let report = match self.transport.fetch_status(&self.endpoint).await {
            Ok(report) => report,
            Err(e) => {
                self.record_failure(&e);
                return PollOutcome::Failed;
            }
        };
        self.record_success();

        if let Some(mode) = report.volume_display {
            if self.volume_display.set(mode).is_ok() {
                tracing::debug!("Receiver {} reports volume as {:?}", self.endpoint, mode);
            }
        }

        let delta = report.to_delta(self.volume_display());
        self.apply(&delta, None);
        PollOutcome::Applied(delta)
    }

    /// Perform a user action on behalf of a proxy.
    ///
    /// Commands run in order and stop at the first failure, which is returned
    /// without touching state. On success the planned delta is applied with
    /// the proxy as origin and the next poll tick is suppressed.
    pub async fn user_action(&self, handle: ProxyHandle, action: UserAction) -> ActionResult<()> {
        let _serial = self.serial.lock().await;

        let action_name = action.name();
        let plan = {
            let mut guard = self.core.lock();
            let core = &mut *guard;
            let (_, proxy) = core
                .proxies
                .iter_mut()
                .find(|(h, _)| *h == handle)
                .ok_or(ActionError::UnknownProxy(handle))?;
            proxy.plan_action(action, &core.state)?
        };

        for command in &plan.commands {
            if let Err(e) = self.transport.send_command(&self.endpoint, command).await {
                tracing::warn!(
                    "{} from {} failed on {}: {}",
                    action_name,
                    handle,
                    self.endpoint,
                    e
                );
                return Err(e.into());
            }
        }

        if !plan.commands.is_empty() {
            self.suppress_next_poll.store(true, Ordering::Release);
        }
        self.apply(&plan.delta, Some(handle));
        Ok(())
    }

    fn apply(&self, delta: &StateDelta, origin: Option<ProxyHandle>) -> usize {
        if delta.is_empty() {
            return 0;
        }

        let (updates, notified) = {
            let mut guard = self.core.lock();
            let core = &mut *guard;

            let changed = core.state.merge(delta);
            if !changed.is_empty() {
                tracing::debug!("Receiver {} changed {:?}", self.endpoint, changed);
            }

            let mut updates: Vec<ObservableUpdate> = Vec::new();
            let mut notified = 0;
            for (handle, proxy) in &core.proxies {
                if Some(*handle) == origin || !proxy.cares_about(delta) {
                    continue;
                }
                updates.extend(proxy.set_receiver_state(delta, &core.state));
                notified += 1;
            }
            (updates, notified)
        };

        for update in updates {
            self.host
                .update_observable(&update.accessory, update.field, update.value);
        }
        notified
    }

    fn record_failure(&self, error: &ClientError) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.reachable.store(false, Ordering::Release);

        if failures == 1 && error.is_forbidden() {
            tracing::warn!("Receiver {}: {}", self.endpoint, error);
        }

        if failures == self.failure_threshold {
            tracing::warn!(
                "Receiver {} unreachable after {} failed polls: {}",
                self.endpoint,
                failures,
                error
            );
        } else {
            tracing::debug!("Poll of {} failed ({}): {}", self.endpoint, failures, error);
        }
    }

    fn record_success(&self) {
        let failures = self.consecutive_failures.swap(0, Ordering::AcqRel);
        self.reachable.store(true, Ordering::Release);

        if failures >= self.failure_threshold {
            tracing::info!("Receiver {} reachable again", self.endpoint);
        }
    }
}

/// Non-owning handle the framework adapter uses for one accessory
#[derive(Debug, Clone)]
pub struct ProxyLink {
    receiver: Weak<Receiver>,
    handle: ProxyHandle,
    accessory: AccessoryId,
}

impl ProxyLink {
    pub fn handle(&self) -> ProxyHandle {
        self.handle
    }

    pub fn accessory(&self) -> AccessoryId {
        self.accessory
    }

    pub fn observable(&self, field: ObservableField) -> ActionResult<Option<ObservableValue>> {
        let receiver = self.receiver.upgrade().ok_or(ActionError::ReceiverGone)?;
        receiver.observable(self.handle, field)
    }

    pub async fn user_action(&self, action: UserAction) -> ActionResult<()> {
        let receiver = self.receiver.upgrade().ok_or(ActionError::ReceiverGone)?;
        receiver.user_action(self.handle, action).await
    }
}
