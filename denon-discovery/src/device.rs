//! Device description parsing and validation.
//!
//! HEOS-capable receivers publish a UPnP description on port 60006. The
//! top-level device carries manufacturer, model and serial; the firmware
//! version lives on one of the nested devices.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};
use crate::ReceiverMetadata;

/// Port of the AIOS description service
pub const DESCRIPTION_PORT: u16 = 60006;

const DESCRIPTION_PATH: &str = "/upnp/desc/aios_device/aios_device.xml";

#[derive(Debug, Deserialize)]
struct Root {
    device: DeviceDescription,
}

/// Top-level device from the description document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    #[serde(default)]
    pub device_type: String,
    pub friendly_name: Option<String>,
    pub manufacturer: String,
    pub model_name: String,
    pub serial_number: Option<String>,
    device_list: Option<DeviceList>,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(rename = "device", default)]
    devices: Vec<NestedDevice>,
}

#[derive(Debug, Deserialize)]
struct NestedDevice {
    firmware_version: Option<String>,
}

impl DeviceDescription {
    /// Parse a description document.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::ParseError` if the XML is malformed or lacks
    /// manufacturer/model.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root: Root = quick_xml::de::from_str(xml)
            .map_err(|e| DiscoveryError::ParseError(format!("Failed to parse device XML: {}", e)))?;

        Ok(root.device)
    }

    /// Firmware version of the first nested device that reports one
    pub fn firmware_version(&self) -> Option<&str> {
        self.device_list
            .as_ref()?
            .devices
            .iter()
            .filter_map(|device| device.firmware_version.as_deref())
            .map(str::trim)
            .find(|version| !version.is_empty())
    }

    /// Whether the responder is a Denon or Marantz receiver
    pub fn is_receiver(&self) -> bool {
        let manufacturer = self.manufacturer.to_lowercase();
        manufacturer.contains("denon")
            || manufacturer.contains("marantz")
            || self.device_type.contains("AiosDevice")
    }

    pub fn to_metadata(&self) -> ReceiverMetadata {
        ReceiverMetadata {
            manufacturer: self.manufacturer.trim().to_string(),
            model_name: self.model_name.trim().to_string(),
            serial_number: self
                .serial_number
                .as_deref()
                .map(str::trim)
                .unwrap_or(crate::FALLBACK_SERIAL)
                .to_string(),
            firmware_revision: self
                .firmware_version()
                .unwrap_or(crate::FALLBACK_FIRMWARE)
                .to_string(),
        }
    }
}

/// URL of the description document for a receiver IP
pub fn description_url(ip: &str) -> String {
    format!("http://{}:{}{}", ip, DESCRIPTION_PORT, DESCRIPTION_PATH)
}

/// Extract the host part of a location URL.
///
/// `http://192.168.1.20:60006/upnp/...` gives `192.168.1.20`.
pub fn extract_ip_from_url(url: &str) -> Option<String> {
    let host = url.split("//").nth(1)?.split(['/', ':']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

pub(crate) fn fetch_description(
    client: &reqwest::blocking::Client,
    location: &str,
) -> Result<DeviceDescription> {
    let response = client
        .get(location)
        .send()
        .map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to fetch device description: {}", e))
        })?;

    if !response.status().is_success() {
        return Err(DiscoveryError::NetworkError(format!(
            "Device description returned HTTP {}",
            response.status().as_u16()
        )));
    }

    let xml = response
        .text()
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to read response body: {}", e)))?;

    DeviceDescription::from_xml(&xml)
}

/// Fetch metadata straight from a known receiver (blocking).
///
/// Used for configured IPs so they do not depend on multicast reaching the
/// bridge.
pub fn probe_metadata(ip: &str, timeout: Duration) -> Result<ReceiverMetadata> {
    probe_metadata_at(&description_url(ip), timeout)
}

/// Same as [`probe_metadata`] with an explicit description URL
pub fn probe_metadata_at(location: &str, timeout: Duration) -> Result<ReceiverMetadata> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DiscoveryError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

    let description = fetch_description(&client, location)?;
    if !description.is_receiver() {
        return Err(DiscoveryError::InvalidDevice(format!(
            "{} by {}",
            description.model_name, description.manufacturer
        )));
    }

    Ok(description.to_metadata())
}
