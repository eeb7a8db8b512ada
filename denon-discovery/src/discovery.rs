//! Core discovery logic and iterator implementation.
//!
//! The iterator:
//! 1. Sends an SSDP M-SEARCH for AIOS devices
//! 2. Drops answers that clearly come from other vendors
//! 3. Fetches each remaining device description over HTTP
//! 4. Yields the receivers whose description checks out

use std::collections::HashSet;
use std::time::Duration;

use crate::device::{extract_ip_from_url, fetch_description};
use crate::error::{DiscoveryError, Result};
use crate::ssdp::{SsdpClient, SsdpResponse, AIOS_DEVICE_TARGET};
use crate::{DeviceEvent, DiscoveredReceiver};

/// Iterator that discovers receivers on the local network.
///
/// Blocking: the first call to `next()` runs the whole SSDP window. Run it on
/// a blocking task from async code.
pub struct DiscoveryIterator {
    ssdp_client: Option<SsdpClient>,
    ssdp_buffer: Vec<SsdpResponse>,
    buffer_index: usize,
    seen_locations: HashSet<String>,
    http_client: reqwest::blocking::Client,
}

impl DiscoveryIterator {
    /// Create a new discovery iterator with the specified timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let ssdp_client = SsdpClient::new(timeout)?;
        let http_client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DiscoveryError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            ssdp_client: Some(ssdp_client),
            ssdp_buffer: Vec::new(),
            buffer_index: 0,
            seen_locations: HashSet::new(),
            http_client,
        })
    }

    /// Iterator that yields nothing, used when the socket cannot be opened
    pub(crate) fn empty() -> Self {
        Self {
            ssdp_client: None,
            ssdp_buffer: Vec::new(),
            buffer_index: 0,
            seen_locations: HashSet::new(),
            http_client: reqwest::blocking::Client::new(),
        }
    }

    /// Cheap pre-filter on SSDP headers before any HTTP request
    fn is_likely_receiver(response: &SsdpResponse) -> bool {
        if response.location.contains("aios_device") {
            return true;
        }

        response.server.as_ref().is_some_and(|server| {
            let server = server.to_lowercase();
            server.contains("denon") || server.contains("marantz") || server.contains("heos")
        })
    }

    fn fill_buffer(&mut self) {
        if let Some(client) = self.ssdp_client.take() {
            match client.search(AIOS_DEVICE_TARGET) {
                Ok(iter) => {
                    for result in iter {
                        match result {
                            Ok(response) => self.ssdp_buffer.push(response),
                            Err(e) => tracing::debug!("SSDP receive failed: {}", e),
                        }
                    }
                }
                Err(e) => tracing::warn!("SSDP search failed: {}", e),
            }
        }
    }
}

impl Iterator for DiscoveryIterator {
    type Item = DeviceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ssdp_client.is_some() {
            self.fill_buffer();
        }

        while let Some(response) = self.ssdp_buffer.get(self.buffer_index) {
            self.buffer_index += 1;

            if !self.seen_locations.insert(response.location.clone()) {
                continue;
            }
            if !Self::is_likely_receiver(response) {
                continue;
            }

            let Some(ip) = extract_ip_from_url(&response.location) else {
                continue;
            };

            let description = match fetch_description(&self.http_client, &response.location) {
                Ok(description) => description,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", response.location, e);
                    continue;
                }
            };
            if !description.is_receiver() {
                continue;
            }

            return Some(DeviceEvent::Found(DiscoveredReceiver {
                ip,
                metadata: description.to_metadata(),
            }));
        }

        None
    }
}
