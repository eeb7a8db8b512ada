//! Accessory reconciliation store
//!
//! The framework restores accessories it published in a previous run. Each
//! proxy claims its identity by a stable key; a restored accessory that
//! nothing claims is stale and should be unregistered.

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{EntryKind, ReceiverEntry};
use crate::model::AccessoryId;

/// Stable identity of an accessory across restarts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessoryKey {
    pub ip: String,
    pub name: String,
    /// Kind plus kind-specific detail, e.g. `switch:CD`
    pub discriminator: String,
}

impl AccessoryKey {
    pub fn for_entry(entry: &ReceiverEntry) -> Self {
        let discriminator = match &entry.kind {
            EntryKind::Switch { input_id, .. } => {
                format!("switch:{}", input_id.as_deref().map(str::trim).unwrap_or("*"))
            }
            EntryKind::Television { .. } => "television".to_string(),
            EntryKind::Volume { .. } => "volume".to_string(),
        };

        Self {
            ip: entry.ip.trim().to_string(),
            name: entry.name.trim().to_string(),
            discriminator,
        }
    }
}

impl fmt::Display for AccessoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.ip, self.discriminator)
    }
}

/// An accessory the framework restored from its cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredAccessory {
    pub id: AccessoryId,
    pub key: AccessoryKey,
}

#[derive(Debug, Default)]
struct StoreInner {
    restored: HashMap<AccessoryKey, AccessoryId>,
    claimed: HashSet<AccessoryKey>,
}

#[derive(Debug, Default)]
pub struct AccessoryStore {
    inner: Mutex<StoreInner>,
}

impl AccessoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with restored accessories
    pub fn seeded(restored: impl IntoIterator<Item = RestoredAccessory>) -> Self {
        let store = Self::new();
        store.seed(restored);
        store
    }

    pub fn seed(&self, restored: impl IntoIterator<Item = RestoredAccessory>) {
        let mut inner = self.inner.lock();
        for accessory in restored {
            inner.restored.insert(accessory.key, accessory.id);
        }
    }

    /// Identity for `key`: the restored one if present, otherwise a fresh id.
    ///
    /// Claiming the same key twice returns the same id.
    pub fn claim(&self, key: &AccessoryKey) -> AccessoryId {
        let mut inner = self.inner.lock();
        inner.claimed.insert(key.clone());

        if let Some(id) = inner.restored.get(key) {
            tracing::debug!("Reusing cached accessory {} for {}", id, key);
            return *id;
        }

        let id = AccessoryId::new_v4();
        inner.restored.insert(key.clone(), id);
        id
    }

    /// Restored accessories nobody claimed
    pub fn unclaimed(&self) -> Vec<RestoredAccessory> {
        let inner = self.inner.lock();
        inner
            .restored
            .iter()
            .filter(|(key, _)| !inner.claimed.contains(*key))
            .map(|(key, id)| RestoredAccessory {
                id: *id,
                key: key.clone(),
            })
            .collect()
    }
}
