//! Time-bounded registry of discovered receivers
//!
//! One registry is created at startup and shared (behind an `Arc`) between
//! the discovery listener, which writes, and every receiver waiting for its
//! metadata, which reads. The discovery window only bounds how long startup
//! waits; late discoveries are still recorded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};

use crate::{DeviceEvent, DiscoveredReceiver, ReceiverMetadata};

/// Default length of the discovery window
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct DiscoveryRegistry {
    entries: DashMap<String, ReceiverMetadata>,
    opened_at: Instant,
    window: Duration,
    host_launched: AtomicBool,
    deadline_reported: DashSet<String>,
}

impl DiscoveryRegistry {
    /// Open a registry whose window starts now
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            opened_at: Instant::now(),
            window,
            host_launched: AtomicBool::new(false),
            deadline_reported: DashSet::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Instant at which the discovery window closes
    pub fn window_deadline(&self) -> Instant {
        self.opened_at + self.window
    }

    pub fn window_open(&self) -> bool {
        Instant::now() < self.window_deadline()
    }

    /// Record metadata for an IP.
    ///
    /// Metadata is immutable once known: the first record wins and later
    /// ones are ignored. Returns `true` if this call added the entry.
    pub fn record(&self, ip: impl Into<String>, metadata: ReceiverMetadata) -> bool {
        let ip = ip.into();
        let late = !self.window_open();

        let mut inserted = false;
        self.entries.entry(ip.clone()).or_insert_with(|| {
            inserted = true;
            metadata
        });

        if inserted {
            if late {
                tracing::info!("Receiver {} discovered after the discovery window closed", ip);
            } else {
                tracing::debug!("Receiver {} discovered", ip);
            }
        }
        inserted
    }

    /// Record a discovery event from the SSDP listener
    pub fn record_event(&self, event: DeviceEvent) -> bool {
        match event {
            DeviceEvent::Found(found) => self.record(found.ip, found.metadata),
        }
    }

    /// Non-blocking lookup used by receivers waiting on discovery.
    ///
    /// Returns `Some` only once data for `ip` has been recorded, and keeps
    /// returning the same value on every later call. `deadline` is the
    /// caller's give-up point; passing it without data is logged once per IP.
    pub fn await_metadata(&self, ip: &str, deadline: Instant) -> Option<ReceiverMetadata> {
        if let Some(metadata) = self.entries.get(ip) {
            return Some(metadata.clone());
        }

        if Instant::now() >= deadline && self.deadline_reported.insert(ip.to_string()) {
            tracing::warn!(
                "Receiver {} has not been discovered within {:?}; still listening",
                ip,
                self.window
            );
        }
        None
    }

    /// Signal that the host application has finished launching
    pub fn mark_host_launched(&self) {
        self.host_launched.store(true, Ordering::SeqCst);
    }

    pub fn host_launched(&self) -> bool {
        self.host_launched.load(Ordering::SeqCst)
    }

    /// Snapshot of everything recorded so far
    pub fn discovered(&self) -> Vec<DiscoveredReceiver> {
        self.entries
            .iter()
            .map(|entry| DiscoveredReceiver {
                ip: entry.key().clone(),
                metadata: entry.value().clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DiscoveryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn metadata(model: &str) -> ReceiverMetadata {
        ReceiverMetadata {
            manufacturer: "Denon".to_string(),
            model_name: model.to_string(),
            serial_number: "SN1".to_string(),
            firmware_revision: "1.0".to_string(),
        }
    }

    #[test]
    fn test_lookup_before_and_after_record() {
        let registry = DiscoveryRegistry::default();
        let deadline = registry.window_deadline();

        assert!(registry.await_metadata("192.168.1.20", deadline).is_none());

        assert!(registry.record("192.168.1.20", metadata("AVR-X2700H")));

        let found = registry.await_metadata("192.168.1.20", deadline).unwrap();
        assert_eq!(found.model_name, "AVR-X2700H");
        // Idempotent on repeated calls
        assert_eq!(registry.await_metadata("192.168.1.20", deadline), Some(found));
    }

    #[test]
    fn test_first_record_wins() {
        let registry = DiscoveryRegistry::default();

        assert!(registry.record("192.168.1.20", metadata("first")));
        assert!(!registry.record("192.168.1.20", metadata("second")));

        let found = registry
            .await_metadata("192.168.1.20", Instant::now())
            .unwrap();
        assert_eq!(found.model_name, "first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_late_records_are_accepted() {
        let registry = DiscoveryRegistry::new(Duration::ZERO);
        assert!(!registry.window_open());

        assert!(registry.record("192.168.1.21", metadata("late")));
        assert!(registry.await_metadata("192.168.1.21", Instant::now()).is_some());
    }

    #[test]
    fn test_expired_deadline_still_returns_none_without_data() {
        let registry = DiscoveryRegistry::new(Duration::ZERO);

        assert!(registry.await_metadata("192.168.1.99", Instant::now()).is_none());
        assert!(registry.await_metadata("192.168.1.99", Instant::now()).is_none());
    }

    #[test]
    fn test_host_launched_gate() {
        let registry = DiscoveryRegistry::default();
        assert!(!registry.host_launched());
        registry.mark_host_launched();
        assert!(registry.host_launched());
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let registry = Arc::new(DiscoveryRegistry::default());
        let deadline = registry.window_deadline();

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.record(format!("10.0.0.{}", i), metadata("model"));
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let readers: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.await_metadata(&format!("10.0.0.{}", i), deadline)
                })
            })
            .collect();
        for reader in readers {
            assert!(reader.join().unwrap().is_some());
        }
        assert_eq!(registry.discovered().len(), 8);
    }

    #[test]
    fn test_record_event() {
        let registry = DiscoveryRegistry::default();
        let event = DeviceEvent::Found(DiscoveredReceiver {
            ip: "192.168.1.22".to_string(),
            metadata: metadata("SR5015"),
        });

        assert!(registry.record_event(event));
        assert!(!registry.is_empty());
    }
}
