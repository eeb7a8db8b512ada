//! Boundary to the smart-home accessory framework

use denon_discovery::ReceiverMetadata;
use serde::Serialize;

use crate::model::{AccessoryId, ObservableField, ObservableValue, ProxyKind};

/// Everything the framework needs to publish one accessory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessoryRegistration {
    pub id: AccessoryId,
    pub name: String,
    pub kind: ProxyKind,
    pub metadata: ReceiverMetadata,
    /// Television input names in index order; empty for other kinds
    pub inputs: Vec<String>,
}

/// Accessory framework seam.
///
/// Calls are made outside of any receiver lock, so implementations may call
/// back into [`ProxyLink`](crate::ProxyLink) getters.
pub trait AccessoryHost: Send + Sync {
    fn register_accessory(&self, registration: &AccessoryRegistration);

    fn update_observable(
        &self,
        accessory: &AccessoryId,
        field: ObservableField,
        value: ObservableValue,
    );

    fn unregister_accessory(&self, accessory: &AccessoryId);
}
