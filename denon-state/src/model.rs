//! Core data types: canonical receiver state, identities and the accessory
//! boundary vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};
use status_client::{DeltaField, StateDelta, MAX_VOLUME_LEVEL};
use uuid::Uuid;

/// Canonical state of one physical receiver.
///
/// Owned by exactly one [`Receiver`](crate::Receiver); everything else reads
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverState {
    pub powered_on: bool,
    pub active_input: Option<String>,
    /// 0..=100
    pub volume_level: u8,
    pub muted: bool,
}

impl ReceiverState {
    /// Merge a sparse delta into the state.
    ///
    /// Only fields present in `delta` are written. Returns the fields whose
    /// value actually changed.
    pub fn merge(&mut self, delta: &StateDelta) -> Vec<DeltaField> {
        let mut changed = Vec::new();

        if let Some(power) = delta.power {
            if self.powered_on != power {
                self.powered_on = power;
                changed.push(DeltaField::Power);
            }
        }
        if let Some(input) = &delta.active_input {
            if self.active_input.as_deref() != Some(input.as_str()) {
                self.active_input = Some(input.clone());
                changed.push(DeltaField::ActiveInput);
            }
        }
        if let Some(level) = delta.volume_level {
            let level = level.min(MAX_VOLUME_LEVEL);
            if self.volume_level != level {
                self.volume_level = level;
                changed.push(DeltaField::VolumeLevel);
            }
        }
        if let Some(muted) = delta.muted {
            if self.muted != muted {
                self.muted = muted;
                changed.push(DeltaField::Muted);
            }
        }

        changed
    }
}

/// Stable identity of a proxy attached to a receiver.
///
/// Assigned at attach time and used for broadcast self-exclusion, so two
/// accessories with the same display name never shadow each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyHandle(pub(crate) u32);

impl ProxyHandle {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of an accessory as the framework knows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessoryId(Uuid);

impl AccessoryId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AccessoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three accessory flavours a receiver can be exposed as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyKind {
    Switch,
    Television,
    VolumeDimmer,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyKind::Switch => "Switch",
            ProxyKind::Television => "Television",
            ProxyKind::VolumeDimmer => "Volume dimmer",
        };
        f.write_str(name)
    }
}

/// Accessory-visible attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservableField {
    /// Switch and dimmer on/off
    On,
    /// Television power
    Active,
    /// Television selected input, as an index into the bound inputs
    ActiveIdentifier,
    /// Dimmer level, mirrors the volume
    Brightness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservableValue {
    Bool(bool),
    Index(u32),
    Level(u8),
}

/// A value to push to the accessory framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableUpdate {
    pub accessory: AccessoryId,
    pub field: ObservableField,
    pub value: ObservableValue,
}

/// Remote-control buttons of a television accessory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteKey {
    Rewind,
    FastForward,
    NextTrack,
    PreviousTrack,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Select,
    Back,
    Exit,
    PlayPause,
    Information,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeDirection {
    Up,
    Down,
}

/// A request coming from the accessory framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SetOn(bool),
    SetActive(bool),
    SelectInput(u32),
    RemoteKey(RemoteKey),
    VolumeStep(VolumeDirection),
    PowerModeSelection,
    RenameInput { index: u32, name: String },
    SetBrightness(u8),
}

impl UserAction {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            UserAction::SetOn(_) => "SetOn",
            UserAction::SetActive(_) => "SetActive",
            UserAction::SelectInput(_) => "SelectInput",
            UserAction::RemoteKey(_) => "RemoteKey",
            UserAction::VolumeStep(_) => "VolumeStep",
            UserAction::PowerModeSelection => "PowerModeSelection",
            UserAction::RenameInput { .. } => "RenameInput",
            UserAction::SetBrightness(_) => "SetBrightness",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_delta() -> impl Strategy<Value = StateDelta> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of(prop_oneof![
                Just("CD".to_string()),
                Just("TUNER".to_string()),
                Just("SAT/CBL".to_string()),
            ]),
            proptest::option::of(0u8..=100),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(power, active_input, volume_level, muted)| StateDelta {
                power,
                active_input,
                volume_level,
                muted,
            })
    }

    fn arb_state() -> impl Strategy<Value = ReceiverState> {
        arb_delta().prop_map(|delta| {
            let mut state = ReceiverState::default();
            state.merge(&delta);
            state
        })
    }

    proptest! {
        #[test]
        fn merge_only_touches_present_fields(before in arb_state(), delta in arb_delta()) {
            let mut state = before.clone();
            state.merge(&delta);

            if delta.power.is_none() {
                prop_assert_eq!(state.powered_on, before.powered_on);
            } else {
                prop_assert_eq!(Some(state.powered_on), delta.power);
            }
            if delta.active_input.is_none() {
                prop_assert_eq!(&state.active_input, &before.active_input);
            } else {
                prop_assert_eq!(&state.active_input, &delta.active_input);
            }
            if delta.volume_level.is_none() {
                prop_assert_eq!(state.volume_level, before.volume_level);
            } else {
                prop_assert_eq!(Some(state.volume_level), delta.volume_level);
            }
            if delta.muted.is_none() {
                prop_assert_eq!(state.muted, before.muted);
            } else {
                prop_assert_eq!(Some(state.muted), delta.muted);
            }
        }

        #[test]
        fn merge_is_idempotent(initial in arb_state(), delta in arb_delta()) {
            let mut state = initial;
            state.merge(&delta);
            let once = state.clone();

            let changed = state.merge(&delta);

            prop_assert_eq!(state, once);
            prop_assert!(changed.is_empty());
        }
    }

    #[test]
    fn test_absent_power_is_not_off() {
        let mut state = ReceiverState {
            powered_on: true,
            ..Default::default()
        };

        state.merge(&StateDelta::new().with_muted(true));

        assert!(state.powered_on);
        assert!(state.muted);
    }

    #[test]
    fn test_merge_reports_changed_fields() {
        let mut state = ReceiverState::default();
        let changed = state.merge(
            &StateDelta::new()
                .with_power(false)
                .with_active_input("CD")
                .with_volume_level(40),
        );

        // power was already false
        assert_eq!(changed, vec![DeltaField::ActiveInput, DeltaField::VolumeLevel]);
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(ProxyHandle(3).to_string(), "#3");
        assert_eq!(ProxyKind::VolumeDimmer.to_string(), "Volume dimmer");
        assert_eq!(UserAction::SetBrightness(10).name(), "SetBrightness");
    }
}
