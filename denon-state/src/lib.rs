//! Receiver synchronization engine
//!
//! Keeps every accessory that refers to the same Denon/Marantz receiver
//! consistent. Each physical receiver gets one [`Receiver`] that owns its
//! canonical state, polls the device, and fans changes out to its attached
//! [`AccessoryProxy`] values. Local user actions write optimistically and
//! suppress the very next poll so the accessory does not flap.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use denon_state::{BridgeConfig, LaunchContext, launch_all};
//!
//! let config = BridgeConfig::load("config.json")?;
//! let ctx = LaunchContext {
//!     transport: Arc::new(status_client::StatusClient::new()),
//!     host,
//!     registry,
//!     store: Arc::new(denon_state::AccessoryStore::new()),
//!     settings: config.settings()?,
//! };
//! let handles = launch_all(config.receiver_plans(), &ctx);
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod port;
pub mod proxy;
pub mod receiver;
pub mod store;

pub use config::{
    BoundInput, BridgeConfig, EntryKind, ReceiverEntry, ReceiverPlan, ReceiverSettings,
};
pub use error::{ActionError, ActionResult, ConfigError, ConfigResult};
pub use host::{AccessoryHost, AccessoryRegistration};
pub use lifecycle::{
    launch_all, resolve_plan, spawn_receiver, LaunchContext, ReceiverHandle, ReceiverPhase,
};
pub use model::{
    AccessoryId, ObservableField, ObservableUpdate, ObservableValue, ProxyHandle, ProxyKind,
    ReceiverState, RemoteKey, UserAction, VolumeDirection,
};
pub use port::{probe_auto_port, PortResolver, PortSpec};
pub use proxy::{AccessoryProxy, ActionPlan};
pub use receiver::{PollOutcome, ProxyLink, Receiver};
pub use store::{AccessoryKey, AccessoryStore, RestoredAccessory};

pub use status_client::{DeltaField, StateDelta};
