//! Denon / Marantz receiver discovery
//!
//! Finds receivers on the local network with SSDP, reads their UPnP device
//! description for descriptive metadata, and keeps what was found in a
//! [`DiscoveryRegistry`] that receivers poll while they wait to start.
//!
//! # Iterator-based Discovery
//!
//! ```no_run
//! use denon_discovery::{get_iter, DeviceEvent};
//!
//! for event in get_iter() {
//!     match event {
//!         DeviceEvent::Found(receiver) => {
//!             println!("{} at {}", receiver.metadata.model_name, receiver.ip);
//!         }
//!     }
//! }
//! ```
//!
//! # Feeding the registry
//!
//! ```no_run
//! use denon_discovery::{get_iter, DiscoveryRegistry};
//!
//! let registry = DiscoveryRegistry::default();
//! for event in get_iter() {
//!     registry.record_event(event);
//! }
//! println!("{} receivers known", registry.len());
//! ```

mod error;
mod ssdp;
pub mod device;
mod discovery;
mod registry;

pub use device::{description_url, probe_metadata, probe_metadata_at, DESCRIPTION_PORT};
pub use discovery::DiscoveryIterator;
pub use error::{DiscoveryError, Result};
pub use registry::{DiscoveryRegistry, DEFAULT_DISCOVERY_WINDOW};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Manufacturer reported when no description could be read
pub const FALLBACK_MANUFACTURER: &str = "Denon";

/// Model reported when no description could be read and none is configured
pub const FALLBACK_MODEL: &str = "denon-avr-bridge";

/// Serial reported when the description carries none
pub const FALLBACK_SERIAL: &str = "MVV123";

/// Firmware revision reported when the description carries none
pub const FALLBACK_FIRMWARE: &str = "0.0";

/// Descriptive fields shown on the receiver's accessories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverMetadata {
    pub manufacturer: String,
    pub model_name: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl ReceiverMetadata {
    /// Placeholder metadata for a receiver that was never discovered
    pub fn fallback(model: Option<&str>) -> Self {
        Self {
            manufacturer: FALLBACK_MANUFACTURER.to_string(),
            model_name: model
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .unwrap_or(FALLBACK_MODEL)
                .to_string(),
            serial_number: FALLBACK_SERIAL.to_string(),
            firmware_revision: FALLBACK_FIRMWARE.to_string(),
        }
    }
}

/// A receiver found on the network
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredReceiver {
    /// Host address taken from the SSDP location
    pub ip: String,
    pub metadata: ReceiverMetadata,
}

/// Events emitted during discovery
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Found(DiscoveredReceiver),
}

/// Discover receivers with the default 3-second timeout
pub fn get_iter() -> DiscoveryIterator {
    get_iter_with_timeout(DEFAULT_DISCOVERY_WINDOW)
}

/// Discover receivers with a custom timeout.
///
/// The timeout bounds the SSDP collection window and each description fetch.
/// If the UDP socket cannot be opened the iterator is simply empty.
pub fn get_iter_with_timeout(timeout: Duration) -> DiscoveryIterator {
    DiscoveryIterator::new(timeout).unwrap_or_else(|e| {
        tracing::warn!("SSDP discovery unavailable: {}", e);
        DiscoveryIterator::empty()
    })
}

/// Collect every receiver found within `timeout`
pub fn get_with_timeout(timeout: Duration) -> Vec<DiscoveredReceiver> {
    get_iter_with_timeout(timeout)
        .map(|event| match event {
            DeviceEvent::Found(receiver) => receiver,
        })
        .collect()
}
