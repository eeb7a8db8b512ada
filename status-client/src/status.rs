//! Status document parsing
//!
//! Receivers answer the lightweight status query with a flat XML document:
//!
//! ```xml
//! <item>
//!   <Power><value>ON</value></Power>
//!   <InputFuncSelect><value>CD</value></InputFuncSelect>
//!   <VolumeDisplay><value>Absolute</value></VolumeDisplay>
//!   <MasterVolume><value>-20.0</value></MasterVolume>
//!   <Mute><value>off</value></Mute>
//! </item>
//! ```
//!
//! Every element is optional. A missing element becomes an absent field in the
//! resulting [`StateDelta`], never a default value.

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Offset added to the reported master volume in absolute display mode
pub const ABSOLUTE_VOLUME_OFFSET: f32 = 80.0;

/// Highest canonical volume level
pub const MAX_VOLUME_LEVEL: u8 = 100;

/// Sparse update of receiver state.
///
/// `None` means "unknown / unchanged". A delta with `power: None` says nothing
/// about whether the receiver is on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub power: Option<bool>,
    pub active_input: Option<String>,
    pub volume_level: Option<u8>,
    pub muted: Option<bool>,
}

/// Names of the fields a [`StateDelta`] can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaField {
    Power,
    ActiveInput,
    VolumeLevel,
    Muted,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_power(mut self, power: bool) -> Self {
        self.power = Some(power);
        self
    }

    pub fn with_active_input(mut self, input: impl Into<String>) -> Self {
        self.active_input = Some(input.into());
        self
    }

    pub fn with_volume_level(mut self, level: u8) -> Self {
        self.volume_level = Some(level.min(MAX_VOLUME_LEVEL));
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = Some(muted);
        self
    }

    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        self.power.is_none()
            && self.active_input.is_none()
            && self.volume_level.is_none()
            && self.muted.is_none()
    }

    /// Whether the given field is present
    pub fn has(&self, field: DeltaField) -> bool {
        match field {
            DeltaField::Power => self.power.is_some(),
            DeltaField::ActiveInput => self.active_input.is_some(),
            DeltaField::VolumeLevel => self.volume_level.is_some(),
            DeltaField::Muted => self.muted.is_some(),
        }
    }

    /// Iterate over the fields present in this delta
    pub fn fields(&self) -> impl Iterator<Item = DeltaField> + '_ {
        [
            DeltaField::Power,
            DeltaField::ActiveInput,
            DeltaField::VolumeLevel,
            DeltaField::Muted,
        ]
        .into_iter()
        .filter(move |field| self.has(*field))
    }
}

/// How the receiver presents its master volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeDisplay {
    Absolute,
    Relative,
}

impl VolumeDisplay {
    fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("absolute") {
            Some(VolumeDisplay::Absolute)
        } else if value.eq_ignore_ascii_case("relative") {
            Some(VolumeDisplay::Relative)
        } else {
            None
        }
    }
}

/// Normalize a reported master volume onto the 0..=100 canonical scale
pub fn normalize_volume(raw: f32, display: VolumeDisplay) -> u8 {
    let level = match display {
        VolumeDisplay::Absolute => raw + ABSOLUTE_VOLUME_OFFSET,
        VolumeDisplay::Relative => raw,
    };
    level.round().clamp(0.0, f32::from(MAX_VOLUME_LEVEL)) as u8
}

/// Parsed status document, before volume normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub power: Option<bool>,
    pub active_input: Option<String>,
    pub volume_display: Option<VolumeDisplay>,
    pub master_volume: Option<f32>,
    pub muted: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    #[serde(rename = "Power")]
    power: Option<ValueElement>,
    #[serde(rename = "InputFuncSelect")]
    input_func_select: Option<ValueElement>,
    #[serde(rename = "VolumeDisplay")]
    volume_display: Option<ValueElement>,
    #[serde(rename = "MasterVolume")]
    master_volume: Option<ValueElement>,
    #[serde(rename = "Mute")]
    mute: Option<ValueElement>,
}

#[derive(Debug, Deserialize)]
struct ValueElement {
    value: Option<String>,
}

impl ValueElement {
    fn text(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

fn text_of(element: &Option<ValueElement>) -> Option<&str> {
    element.as_ref().and_then(ValueElement::text)
}

impl StatusReport {
    /// Parse the status document returned by the device
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document: StatusDocument = quick_xml::de::from_str(xml)
            .map_err(|e| ClientError::Parse(format!("Failed to parse status XML: {}", e)))?;

        Ok(Self {
            power: text_of(&document.power).map(|value| value.eq_ignore_ascii_case("ON")),
            active_input: text_of(&document.input_func_select).map(str::to_string),
            volume_display: text_of(&document.volume_display).and_then(VolumeDisplay::parse),
            // "--" is reported while the zone is in standby
            master_volume: text_of(&document.master_volume).and_then(|v| v.parse::<f32>().ok()),
            muted: text_of(&document.mute).map(|value| value.eq_ignore_ascii_case("on")),
        })
    }

    /// Convert into a delta using the given volume display mode.
    ///
    /// Without a known display mode the volume cannot be normalized, so the
    /// volume field is left absent.
    pub fn to_delta(&self, display: Option<VolumeDisplay>) -> StateDelta {
        let volume_level = match (self.master_volume, display) {
            (Some(raw), Some(display)) => Some(normalize_volume(raw, display)),
            _ => None,
        };

        StateDelta {
            power: self.power,
            active_input: self.active_input.clone(),
            volume_level,
            muted: self.muted,
        }
    }
}
