//! Accessory host that logs instead of publishing
//!
//! Stands in for a smart-home framework: it keeps the latest value of every
//! observable so the bridge can run headless and be inspected in logs.

use dashmap::DashMap;
use tracing::info;

use denon_state::{
    AccessoryHost, AccessoryId, AccessoryRegistration, ObservableField, ObservableValue,
};

#[derive(Debug, Default)]
pub struct LoggingHost {
    accessories: DashMap<AccessoryId, AccessoryRegistration>,
    values: DashMap<(AccessoryId, ObservableField), ObservableValue>,
}

impl LoggingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value published for an accessory attribute
    pub fn value(
        &self,
        accessory: &AccessoryId,
        field: ObservableField,
    ) -> Option<ObservableValue> {
        self.values.get(&(*accessory, field)).map(|value| *value)
    }

    pub fn accessory_count(&self) -> usize {
        self.accessories.len()
    }

    fn display_name(&self, accessory: &AccessoryId) -> String {
        self.accessories
            .get(accessory)
            .map(|registration| registration.name.clone())
            .unwrap_or_else(|| accessory.to_string())
    }
}

impl AccessoryHost for LoggingHost {
    fn register_accessory(&self, registration: &AccessoryRegistration) {
        info!(
            "Accessory '{}' ({}) on {} {}",
            registration.name,
            registration.kind,
            registration.metadata.manufacturer,
            registration.metadata.model_name
        );
        self.accessories.insert(registration.id, registration.clone());
    }

    fn update_observable(
        &self,
        accessory: &AccessoryId,
        field: ObservableField,
        value: ObservableValue,
    ) {
        let previous = self.values.insert((*accessory, field), value);
        if previous != Some(value) {
            info!("{}: {:?} = {:?}", self.display_name(accessory), field, value);
        }
    }

    fn unregister_accessory(&self, accessory: &AccessoryId) {
        if let Some((_, registration)) = self.accessories.remove(accessory) {
            info!("Accessory '{}' removed", registration.name);
        }
        self.values.retain(|(id, _), _| id != accessory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denon_discovery::ReceiverMetadata;
    use denon_state::ProxyKind;

    fn registration(name: &str) -> AccessoryRegistration {
        AccessoryRegistration {
            id: AccessoryId::new_v4(),
            name: name.to_string(),
            kind: ProxyKind::Switch,
            metadata: ReceiverMetadata::fallback(None),
            inputs: Vec::new(),
        }
    }

    #[test]
    fn test_keeps_latest_value() {
        let host = LoggingHost::new();
        let switch = registration("Denon CD");
        host.register_accessory(&switch);

        host.update_observable(&switch.id, ObservableField::On, ObservableValue::Bool(true));
        host.update_observable(&switch.id, ObservableField::On, ObservableValue::Bool(false));

        assert_eq!(host.accessory_count(), 1);
        assert_eq!(
            host.value(&switch.id, ObservableField::On),
            Some(ObservableValue::Bool(false))
        );
        assert_eq!(host.value(&switch.id, ObservableField::Brightness), None);
    }

    #[test]
    fn test_unregister_forgets_values() {
        let host = LoggingHost::new();
        let kept = registration("Kept");
        let removed = registration("Removed");
        host.register_accessory(&kept);
        host.register_accessory(&removed);
        host.update_observable(&kept.id, ObservableField::On, ObservableValue::Bool(true));
        host.update_observable(&removed.id, ObservableField::On, ObservableValue::Bool(true));

        host.unregister_accessory(&removed.id);

        assert_eq!(host.accessory_count(), 1);
        assert_eq!(host.value(&removed.id, ObservableField::On), None);
        assert_eq!(
            host.value(&kept.id, ObservableField::On),
            Some(ObservableValue::Bool(true))
        );
    }
}
