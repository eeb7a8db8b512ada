//! Dimmer-style volume accessory: on means unmuted, brightness is volume

use status_client::{Command, StateDelta, MAX_DEVICE_VOLUME};

use super::ActionPlan;
use crate::error::ActionResult;
use crate::model::{AccessoryId, ObservableField, ObservableValue, ReceiverState, UserAction};

#[derive(Debug, Clone)]
pub struct VolumeDimmerProxy {
    pub(crate) accessory: AccessoryId,
    pub(crate) name: String,
    volume_limit: u8,
}

impl VolumeDimmerProxy {
    /// The limit is also capped at the highest level the device accepts, so
    /// the optimistic level always equals the one sent
    pub fn new(accessory: AccessoryId, name: impl Into<String>, volume_limit: u8) -> Self {
        Self {
            accessory,
            name: name.into(),
            volume_limit: volume_limit.min(MAX_DEVICE_VOLUME),
        }
    }

    pub fn volume_limit(&self) -> u8 {
        self.volume_limit
    }

    pub(crate) fn cares_about(&self, delta: &StateDelta) -> bool {
        delta.power.is_some() || delta.volume_level.is_some() || delta.muted.is_some()
    }

    /// A receiver that is off always reads as a dimmer that is off
    pub fn is_on(&self, state: &ReceiverState) -> bool {
        state.powered_on && !state.muted
    }

    pub(crate) fn set_receiver_state(
        &self,
        delta: &StateDelta,
        state: &ReceiverState,
    ) -> Vec<(ObservableField, ObservableValue)> {
        let mut values = Vec::new();
        if delta.power.is_some() || delta.muted.is_some() {
            values.push((ObservableField::On, ObservableValue::Bool(self.is_on(state))));
        }
        if delta.volume_level.is_some() {
            values.push((
                ObservableField::Brightness,
                ObservableValue::Level(state.volume_level),
            ));
        }
        values
    }

    pub(crate) fn observable(
        &self,
        field: ObservableField,
        state: &ReceiverState,
    ) -> Option<ObservableValue> {
        match field {
            ObservableField::On => Some(ObservableValue::Bool(self.is_on(state))),
            ObservableField::Brightness => Some(ObservableValue::Level(state.volume_level)),
            _ => None,
        }
    }

    pub(crate) fn plan_action(&self, action: &UserAction) -> Option<ActionResult<ActionPlan>> {
        let plan = match action {
            UserAction::SetOn(true) => {
                ActionPlan::single(Command::MuteOff, StateDelta::new().with_muted(false))
            }
            UserAction::SetOn(false) => {
                ActionPlan::single(Command::MuteOn, StateDelta::new().with_muted(true))
            }
            UserAction::SetBrightness(requested) => {
                let level = (*requested).min(self.volume_limit);
                if level < *requested {
                    tracing::debug!(
                        "{}: volume {} capped at limit {}",
                        self.name,
                        requested,
                        self.volume_limit
                    );
                }
                ActionPlan::single(
                    Command::SetVolume(level),
                    StateDelta::new().with_volume_level(level),
                )
            }
            _ => return None,
        };

        Some(Ok(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimmer(limit: u8) -> VolumeDimmerProxy {
        VolumeDimmerProxy::new(AccessoryId::new_v4(), "Denon Volume", limit)
    }

    #[test]
    fn test_brightness_is_clamped_to_limit() {
        let plan = dimmer(70)
            .plan_action(&UserAction::SetBrightness(95))
            .unwrap()
            .unwrap();

        assert_eq!(plan.commands, vec![Command::SetVolume(70)]);
        assert_eq!(plan.delta.volume_level, Some(70));
    }

    #[test]
    fn test_full_volume_sends_the_level_it_records() {
        let proxy = dimmer(100);
        assert_eq!(proxy.volume_limit(), MAX_DEVICE_VOLUME);

        let plan = proxy
            .plan_action(&UserAction::SetBrightness(100))
            .unwrap()
            .unwrap();

        assert_eq!(plan.commands, vec![Command::SetVolume(MAX_DEVICE_VOLUME)]);
        assert_eq!(plan.delta.volume_level, Some(MAX_DEVICE_VOLUME));
        assert_eq!(
            plan.commands[0].path_and_query(),
            format!("/goform/formiPhoneAppDirect.xml?MV{}", MAX_DEVICE_VOLUME)
        );
    }

    #[test]
    fn test_brightness_below_limit_passes_through() {
        let plan = dimmer(70)
            .plan_action(&UserAction::SetBrightness(35))
            .unwrap()
            .unwrap();

        assert_eq!(plan.commands, vec![Command::SetVolume(35)]);
    }

    #[test]
    fn test_on_maps_to_mute() {
        let on = dimmer(100).plan_action(&UserAction::SetOn(true)).unwrap().unwrap();
        let off = dimmer(100).plan_action(&UserAction::SetOn(false)).unwrap().unwrap();

        assert_eq!(on.commands, vec![Command::MuteOff]);
        assert_eq!(on.delta, StateDelta::new().with_muted(false));
        assert_eq!(off.commands, vec![Command::MuteOn]);
    }

    #[test]
    fn test_off_receiver_reads_off_regardless_of_mute() {
        let proxy = dimmer(100);
        let state = ReceiverState {
            powered_on: false,
            muted: false,
            volume_level: 40,
            ..Default::default()
        };

        assert_eq!(
            proxy.observable(ObservableField::On, &state),
            Some(ObservableValue::Bool(false))
        );
        assert_eq!(
            proxy.observable(ObservableField::Brightness, &state),
            Some(ObservableValue::Level(40))
        );
    }

    #[test]
    fn test_updates_follow_delta_fields() {
        let proxy = dimmer(100);
        let state = ReceiverState {
            powered_on: true,
            volume_level: 55,
            ..Default::default()
        };

        let volume_only =
            proxy.set_receiver_state(&StateDelta::new().with_volume_level(55), &state);
        assert_eq!(
            volume_only,
            vec![(ObservableField::Brightness, ObservableValue::Level(55))]
        );

        let mute_only = proxy.set_receiver_state(&StateDelta::new().with_muted(false), &state);
        assert_eq!(mute_only, vec![(ObservableField::On, ObservableValue::Bool(true))]);

        assert!(!proxy.cares_about(&StateDelta::new().with_active_input("CD")));
    }
}
