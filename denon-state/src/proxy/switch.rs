//! On/off switch bound to power and, optionally, one input

use status_client::{Command, StateDelta};

use super::ActionPlan;
use crate::error::ActionResult;
use crate::model::{AccessoryId, ObservableField, ObservableValue, ReceiverState, UserAction};

#[derive(Debug, Clone)]
pub struct SwitchProxy {
    pub(crate) accessory: AccessoryId,
    pub(crate) name: String,
    required_input: Option<String>,
    poll_all_inputs: bool,
}

impl SwitchProxy {
    pub fn new(
        accessory: AccessoryId,
        name: impl Into<String>,
        required_input: Option<&str>,
        poll_all_inputs: bool,
    ) -> Self {
        let required_input = required_input
            .map(|input| input.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|input| !input.is_empty());

        Self {
            accessory,
            name: name.into(),
            required_input,
            poll_all_inputs,
        }
    }

    pub fn required_input(&self) -> Option<&str> {
        self.required_input.as_deref()
    }

    /// True when the switch only reads "on" for its own input
    fn matches_input(&self) -> bool {
        self.required_input.is_some() && !self.poll_all_inputs
    }

    pub(crate) fn cares_about(&self, delta: &StateDelta) -> bool {
        delta.power.is_some() || (self.matches_input() && delta.active_input.is_some())
    }

    pub fn is_on(&self, state: &ReceiverState) -> bool {
        if !state.powered_on {
            return false;
        }
        match (&self.required_input, self.matches_input()) {
            (Some(required), true) => state.active_input.as_deref() == Some(required.as_str()),
            _ => true,
        }
    }

    pub(crate) fn set_receiver_state(
        &self,
        _delta: &StateDelta,
        state: &ReceiverState,
    ) -> Vec<(ObservableField, ObservableValue)> {
        vec![(ObservableField::On, ObservableValue::Bool(self.is_on(state)))]
    }

    pub(crate) fn observable(
        &self,
        field: ObservableField,
        state: &ReceiverState,
    ) -> Option<ObservableValue> {
        match field {
            ObservableField::On => Some(ObservableValue::Bool(self.is_on(state))),
            _ => None,
        }
    }

    pub(crate) fn plan_action(&self, action: &UserAction) -> Option<ActionResult<ActionPlan>> {
        let UserAction::SetOn(on) = action else {
            return None;
        };

        let plan = if *on {
            let mut plan = ActionPlan::single(Command::PowerOn, StateDelta::new().with_power(true));
            // Switching on also selects the switch's input
            if let Some(input) = &self.required_input {
                plan.commands.push(Command::SelectInput(input.clone()));
                plan.delta.active_input = Some(input.clone());
            }
            plan
        } else {
            ActionPlan::single(Command::PowerStandby, StateDelta::new().with_power(false))
        };

        Some(Ok(plan))
    }
}
