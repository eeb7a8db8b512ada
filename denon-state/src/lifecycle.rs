//! Receiver startup and polling
//!
//! Each receiver runs on its own task:
//!
//! 1. `Initializing`: validate its entries and settle the control port
//! 2. `AwaitingDiscovery`: wait for metadata in the discovery registry
//! 3. `Active`: build the receiver and attach one proxy per entry
//! 4. `Polling`: poll the status endpoint until shut down

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use denon_discovery::{DiscoveryRegistry, ReceiverMetadata};
use rand::Rng;
use status_client::{Endpoint, ReceiverTransport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ReceiverPlan, ReceiverSettings};
use crate::error::ConfigResult;
use crate::host::AccessoryHost;
use crate::port::{probe_auto_port, PortResolver, PortSpec};
use crate::proxy::AccessoryProxy;
use crate::receiver::{PollOutcome, Receiver};
use crate::store::{AccessoryKey, AccessoryStore};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ordered by lifecycle progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReceiverPhase {
    Initializing,
    AwaitingDiscovery,
    Active,
    Polling,
    Stopped,
}

/// Shared collaborators every receiver task needs
#[derive(Clone)]
pub struct LaunchContext {
    pub transport: Arc<dyn ReceiverTransport>,
    pub host: Arc<dyn AccessoryHost>,
    pub registry: Arc<DiscoveryRegistry>,
    pub store: Arc<AccessoryStore>,
    pub settings: ReceiverSettings,
}

/// Validate a receiver's entries and resolve its port
pub fn resolve_plan(plan: &ReceiverPlan) -> ConfigResult<PortSpec> {
    for entry in &plan.entries {
        entry.validate()?;
    }
    PortResolver::resolve(&plan.ip, &plan.entries)
}

/// Handle to a running receiver task.
///
/// Dropping the handle also stops the task at its next wait point.
pub struct ReceiverHandle {
    ip: String,
    phase_tx: Arc<watch::Sender<ReceiverPhase>>,
    phase_rx: watch::Receiver<ReceiverPhase>,
    shutdown: watch::Sender<bool>,
    receiver: Arc<OnceLock<Arc<Receiver>>>,
    task: JoinHandle<()>,
}

impl ReceiverHandle {
    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn phase(&self) -> ReceiverPhase {
        *self.phase_rx.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<ReceiverPhase> {
        self.phase_rx.clone()
    }

    /// Wait until the receiver reaches `phase` or any later one.
    ///
    /// Returns the phase observed, which is `Stopped` if the task ended first.
    pub async fn wait_for(&self, phase: ReceiverPhase) -> ReceiverPhase {
        let mut rx = self.phase_rx.clone();
        let reached = match rx.wait_for(|current| *current >= phase).await {
            Ok(current) => *current,
            Err(_) => ReceiverPhase::Stopped,
        };
        reached
    }

    /// The receiver, once it is active
    pub fn receiver(&self) -> Option<Arc<Receiver>> {
        self.receiver.get().cloned()
    }

    /// Stop polling and abandon any in-flight request
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
        self.phase_tx.send_replace(ReceiverPhase::Stopped);
        tracing::debug!("Receiver {} stopped", self.ip);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start a receiver task for one plan
pub fn spawn_receiver(plan: ReceiverPlan, ctx: LaunchContext) -> ReceiverHandle {
    let (phase_tx, phase_rx) = watch::channel(ReceiverPhase::Initializing);
    let phase_tx = Arc::new(phase_tx);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let slot = Arc::new(OnceLock::new());

    let ip = plan.ip.clone();
    let task_phase = Arc::clone(&phase_tx);
    let task_slot = Arc::clone(&slot);
    let task = tokio::spawn(async move {
        run_receiver(plan, ctx, &task_phase, shutdown_rx, &task_slot).await;
        task_phase.send_replace(ReceiverPhase::Stopped);
    });

    ReceiverHandle {
        ip,
        phase_tx,
        phase_rx,
        shutdown: shutdown_tx,
        receiver: slot,
        task,
    }
}

/// Start one task per plan
pub fn launch_all(plans: Vec<ReceiverPlan>, ctx: &LaunchContext) -> Vec<ReceiverHandle> {
    plans
        .into_iter()
        .map(|plan| spawn_receiver(plan, ctx.clone()))
        .collect()
}

async fn run_receiver(
    plan: ReceiverPlan,
    ctx: LaunchContext,
    phase: &watch::Sender<ReceiverPhase>,
    mut shutdown: watch::Receiver<bool>,
    slot: &OnceLock<Arc<Receiver>>,
) {
    let port = match resolve_plan(&plan) {
        Ok(PortSpec::Fixed(port)) => port,
        Ok(PortSpec::Auto) => probe_auto_port(ctx.transport.as_ref(), &plan.ip).await,
        Err(e) => {
            tracing::error!("Receiver {} not started: {}", plan.ip, e);
            return;
        }
    };

    phase.send_replace(ReceiverPhase::AwaitingDiscovery);
    let Some(metadata) = await_discovery(&plan, &ctx, &mut shutdown).await else {
        return;
    };

    let receiver = Arc::new(Receiver::new(
        Endpoint::new(plan.ip.clone(), port),
        metadata,
        Arc::clone(&ctx.transport),
        Arc::clone(&ctx.host),
        ctx.settings.failure_threshold,
    ));
    for entry in &plan.entries {
        let accessory = ctx.store.claim(&AccessoryKey::for_entry(entry));
        receiver.attach(AccessoryProxy::from_entry(entry, accessory));
    }
    let _ = slot.set(Arc::clone(&receiver));
    phase.send_replace(ReceiverPhase::Active);
    tracing::info!(
        "Receiver {} active: {} {} with {} accessories",
        receiver.endpoint(),
        receiver.metadata().manufacturer,
        receiver.metadata().model_name,
        plan.entries.len()
    );

    let delay = first_poll_delay(ctx.settings.max_jitter);
    tokio::select! {
        _ = shutdown.changed() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    phase.send_replace(ReceiverPhase::Polling);
    poll_loop(&receiver, ctx.settings.poll_interval, &mut shutdown).await;
}

async fn await_discovery(
    plan: &ReceiverPlan,
    ctx: &LaunchContext,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<ReceiverMetadata> {
    let deadline = ctx.registry.window_deadline();
    let started = Instant::now();
    let mut last_report = started;

    loop {
        if let Some(metadata) = ctx.registry.await_metadata(&plan.ip, deadline) {
            return Some(metadata);
        }

        if ctx.settings.discovery_fallback
            && std::time::Instant::now() >= deadline
            && ctx.registry.host_launched()
        {
            tracing::info!(
                "Receiver {} was not discovered; starting with placeholder details",
                plan.ip
            );
            return Some(ReceiverMetadata::fallback(plan.configured_model()));
        }

        let now = Instant::now();
        if now.duration_since(last_report) >= ctx.settings.discovery_log_interval {
            tracing::warn!(
                "Still waiting for receiver {} to be discovered ({:?})",
                plan.ip,
                now.duration_since(started)
            );
            last_report = now;
        }

        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = tokio::time::sleep(ctx.settings.discovery_backoff) => {}
        }
    }
}

/// Random delay before the first poll so receivers do not poll in lockstep
fn first_poll_delay(max_jitter: Duration) -> Duration {
    let max_ms = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

async fn poll_loop(receiver: &Receiver, interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            outcome = receiver.poll_once() => {
                if let PollOutcome::Applied(delta) = outcome {
                    tracing::trace!("Poll of {} applied {:?}", receiver.endpoint(), delta);
                }
            }
        }
    }
}
