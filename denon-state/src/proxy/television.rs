//! Television-style accessory with bound inputs and a remote

use status_client::{Command, StateDelta};

use super::ActionPlan;
use crate::config::BoundInput;
use crate::error::{ActionError, ActionResult};
use crate::model::{
    AccessoryId, ObservableField, ObservableValue, ReceiverState, RemoteKey, UserAction,
    VolumeDirection,
};

/// Code shown as "info" on the receiver's on-screen menu
pub const INFO_CODE: &str = "MNINF";

/// Code that toggles the on-screen setup menu
pub const MENU_CODE: &str = "MNMEN ON";

/// Device code for a remote key, `None` for keys the receiver has no code for
pub fn remote_key_code(key: RemoteKey, switch_info_menu: bool) -> Option<&'static str> {
    let code = match key {
        RemoteKey::ArrowUp => "MNCUP",
        RemoteKey::ArrowDown => "MNCDN",
        RemoteKey::ArrowLeft => "MNCLT",
        RemoteKey::ArrowRight => "MNCRT",
        RemoteKey::Select => "MNENT",
        RemoteKey::Back => "MNRTN",
        RemoteKey::Information if switch_info_menu => MENU_CODE,
        RemoteKey::Information => INFO_CODE,
        RemoteKey::Rewind
        | RemoteKey::FastForward
        | RemoteKey::NextTrack
        | RemoteKey::PreviousTrack
        | RemoteKey::Exit
        | RemoteKey::PlayPause => return None,
    };
    Some(code)
}

#[derive(Debug, Clone)]
pub struct TelevisionProxy {
    pub(crate) accessory: AccessoryId,
    pub(crate) name: String,
    inputs: Vec<BoundInput>,
    switch_info_menu: bool,
}

impl TelevisionProxy {
    pub fn new(
        accessory: AccessoryId,
        name: impl Into<String>,
        inputs: Vec<BoundInput>,
        switch_info_menu: bool,
    ) -> Self {
        Self {
            accessory,
            name: name.into(),
            inputs,
            switch_info_menu,
        }
    }

    pub fn inputs(&self) -> &[BoundInput] {
        &self.inputs
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|input| input.name.clone()).collect()
    }

    /// Index of an input identifier among the bound inputs
    pub fn index_of(&self, identifier: &str) -> Option<u32> {
        self.inputs
            .iter()
            .position(|input| input.identifier == identifier)
            .and_then(|index| u32::try_from(index).ok())
    }

    fn input_at(&self, index: u32) -> ActionResult<&BoundInput> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.inputs.get(i))
            .ok_or(ActionError::InputOutOfRange {
                index,
                len: self.inputs.len(),
            })
    }

    fn menu_code(&self) -> &'static str {
        if self.switch_info_menu {
            INFO_CODE
        } else {
            MENU_CODE
        }
    }

    pub(crate) fn cares_about(&self, delta: &StateDelta) -> bool {
        delta.power.is_some() || delta.active_input.is_some()
    }

    pub(crate) fn set_receiver_state(
        &self,
        delta: &StateDelta,
        state: &ReceiverState,
    ) -> Vec<(ObservableField, ObservableValue)> {
        let mut values = Vec::new();
        if delta.power.is_some() {
            values.push((ObservableField::Active, ObservableValue::Bool(state.powered_on)));
        }
        // The index follows the input whether or not the receiver is on
        if let Some(input) = &delta.active_input {
            match self.index_of(input) {
                Some(index) => values.push((
                    ObservableField::ActiveIdentifier,
                    ObservableValue::Index(index),
                )),
                None => tracing::trace!("{}: input {} is not bound", self.name, input),
            }
        }
        values
    }

    pub(crate) fn observable(
        &self,
        field: ObservableField,
        state: &ReceiverState,
    ) -> Option<ObservableValue> {
        match field {
            ObservableField::Active => Some(ObservableValue::Bool(state.powered_on)),
            ObservableField::ActiveIdentifier => state
                .active_input
                .as_deref()
                .and_then(|input| self.index_of(input))
                .map(ObservableValue::Index),
            _ => None,
        }
    }

    pub(crate) fn plan_action(
        &mut self,
        action: &UserAction,
        _state: &ReceiverState,
    ) -> Option<ActionResult<ActionPlan>> {
        let plan = match action {
            UserAction::SetActive(true) => {
                ActionPlan::single(Command::PowerOn, StateDelta::new().with_power(true))
            }
            UserAction::SetActive(false) => {
                ActionPlan::single(Command::PowerStandby, StateDelta::new().with_power(false))
            }
            UserAction::SelectInput(index) => match self.input_at(*index) {
                Ok(input) => ActionPlan::single(
                    Command::SelectInput(input.identifier.clone()),
                    StateDelta::new().with_active_input(input.identifier.clone()),
                ),
                Err(e) => return Some(Err(e)),
            },
            UserAction::RemoteKey(key) => match remote_key_code(*key, self.switch_info_menu) {
                Some(code) => {
                    ActionPlan::single(Command::Direct(code.to_string()), StateDelta::new())
                }
                None => {
                    tracing::debug!("{}: remote key {:?} has no receiver code", self.name, key);
                    ActionPlan::none()
                }
            },
            UserAction::VolumeStep(direction) => {
                let command = match direction {
                    VolumeDirection::Up => Command::VolumeUp,
                    VolumeDirection::Down => Command::VolumeDown,
                };
                ActionPlan::single(command, StateDelta::new())
            }
            UserAction::PowerModeSelection => {
                ActionPlan::single(Command::Direct(self.menu_code().to_string()), StateDelta::new())
            }
            UserAction::RenameInput { index, name } => {
                let len = self.inputs.len();
                let slot = usize::try_from(*index).ok();
                let Some(input) = slot.and_then(|i| self.inputs.get_mut(i)) else {
                    return Some(Err(ActionError::InputOutOfRange { index: *index, len }));
                };
                // Kept for the process lifetime only
                input.name = name.clone();
                ActionPlan::none()
            }
            _ => return None,
        };

        Some(Ok(plan))
    }
}
