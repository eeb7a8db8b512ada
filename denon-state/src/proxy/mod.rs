//! Accessory proxies
//!
//! A proxy translates canonical receiver state into accessory attributes and
//! user actions into device commands. Proxies never talk to the network or
//! to the framework themselves: the owning [`Receiver`](crate::Receiver) runs
//! the commands a proxy plans and pushes the updates it produces.

mod switch;
mod television;
mod volume;

pub use switch::SwitchProxy;
pub use television::{remote_key_code, TelevisionProxy, INFO_CODE, MENU_CODE};
pub use volume::VolumeDimmerProxy;

use denon_discovery::ReceiverMetadata;
use status_client::{Command, StateDelta};

use crate::config::{EntryKind, ReceiverEntry};
use crate::error::{ActionError, ActionResult};
use crate::host::AccessoryRegistration;
use crate::model::{
    AccessoryId, ObservableField, ObservableUpdate, ObservableValue, ProxyKind, ReceiverState,
    UserAction,
};

/// Commands to send for a user action, and the state they establish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    pub commands: Vec<Command>,
    /// Applied optimistically once every command succeeded
    pub delta: StateDelta,
}

impl ActionPlan {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn single(command: Command, delta: StateDelta) -> Self {
        Self {
            commands: vec![command],
            delta,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AccessoryProxy {
    Switch(SwitchProxy),
    Television(TelevisionProxy),
    VolumeDimmer(VolumeDimmerProxy),
}

impl AccessoryProxy {
    /// Build the proxy described by a configuration entry
    pub fn from_entry(entry: &ReceiverEntry, accessory: AccessoryId) -> Self {
        let name = entry.name.trim().to_string();
        match &entry.kind {
            EntryKind::Switch {
                input_id,
                poll_all_input,
            } => AccessoryProxy::Switch(SwitchProxy::new(
                accessory,
                name,
                input_id.as_deref(),
                *poll_all_input,
            )),
            EntryKind::Television {
                switch_info_menu, ..
            } => AccessoryProxy::Television(TelevisionProxy::new(
                accessory,
                name,
                entry.bound_inputs(),
                *switch_info_menu,
            )),
            EntryKind::Volume { .. } => AccessoryProxy::VolumeDimmer(VolumeDimmerProxy::new(
                accessory,
                name,
                entry.volume_limit(),
            )),
        }
    }

    pub fn kind(&self) -> ProxyKind {
        match self {
            AccessoryProxy::Switch(_) => ProxyKind::Switch,
            AccessoryProxy::Television(_) => ProxyKind::Television,
            AccessoryProxy::VolumeDimmer(_) => ProxyKind::VolumeDimmer,
        }
    }

    pub fn accessory(&self) -> AccessoryId {
        match self {
            AccessoryProxy::Switch(p) => p.accessory,
            AccessoryProxy::Television(p) => p.accessory,
            AccessoryProxy::VolumeDimmer(p) => p.accessory,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AccessoryProxy::Switch(p) => &p.name,
            AccessoryProxy::Television(p) => &p.name,
            AccessoryProxy::VolumeDimmer(p) => &p.name,
        }
    }

    pub fn registration(&self, metadata: &ReceiverMetadata) -> AccessoryRegistration {
        let inputs = match self {
            AccessoryProxy::Television(tv) => tv.input_names(),
            _ => Vec::new(),
        };

        AccessoryRegistration {
            id: self.accessory(),
            name: self.name().to_string(),
            kind: self.kind(),
            metadata: metadata.clone(),
            inputs,
        }
    }

    /// Whether any field present in `delta` is one this proxy reacts to
    pub fn cares_about(&self, delta: &StateDelta) -> bool {
        match self {
            AccessoryProxy::Switch(p) => p.cares_about(delta),
            AccessoryProxy::Television(p) => p.cares_about(delta),
            AccessoryProxy::VolumeDimmer(p) => p.cares_about(delta),
        }
    }

    /// Attribute updates for a delta already merged into `state`
    pub fn set_receiver_state(
        &self,
        delta: &StateDelta,
        state: &ReceiverState,
    ) -> Vec<ObservableUpdate> {
        let accessory = self.accessory();
        let values = match self {
            AccessoryProxy::Switch(p) => p.set_receiver_state(delta, state),
            AccessoryProxy::Television(p) => p.set_receiver_state(delta, state),
            AccessoryProxy::VolumeDimmer(p) => p.set_receiver_state(delta, state),
        };

        values
            .into_iter()
            .map(|(field, value)| ObservableUpdate {
                accessory,
                field,
                value,
            })
            .collect()
    }

    /// Current value of an attribute; `None` when this kind does not expose it
    /// or the value is not known yet
    pub fn observable(
        &self,
        field: ObservableField,
        state: &ReceiverState,
    ) -> Option<ObservableValue> {
        match self {
            AccessoryProxy::Switch(p) => p.observable(field, state),
            AccessoryProxy::Television(p) => p.observable(field, state),
            AccessoryProxy::VolumeDimmer(p) => p.observable(field, state),
        }
    }

    /// Plan the commands for a user action
    pub fn plan_action(
        &mut self,
        action: UserAction,
        state: &ReceiverState,
    ) -> ActionResult<ActionPlan> {
        let kind = self.kind();
        let planned = match self {
            AccessoryProxy::Switch(p) => p.plan_action(&action),
            AccessoryProxy::Television(p) => p.plan_action(&action, state),
            AccessoryProxy::VolumeDimmer(p) => p.plan_action(&action),
        };

        planned.unwrap_or_else(|| {
            Err(ActionError::Unsupported {
                kind,
                action: action.name(),
            })
        })
    }
}
