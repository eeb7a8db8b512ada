//! Bridge configuration
//!
//! The configuration file is JSON with camelCase keys. Entries naming the
//! same `ip` describe accessories of one physical receiver and are grouped
//! into a single [`ReceiverPlan`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(3);
pub const DEFAULT_DISCOVERY_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_DISCOVERY_LOG_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_VOLUME_LIMIT: u8 = 100;

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Seconds between status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,

    /// Seconds before a single HTTP request is abandoned
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Seconds the SSDP search runs at startup
    #[serde(default = "default_discovery_window")]
    pub discovery_window: f64,

    /// Start undiscovered receivers with placeholder metadata
    #[serde(default)]
    pub discovery_fallback: bool,

    #[serde(default)]
    pub receivers: Vec<ReceiverEntry>,
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL.as_secs_f64()
}

fn default_request_timeout() -> f64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs_f64()
}

fn default_discovery_window() -> f64 {
    DEFAULT_DISCOVERY_WINDOW.as_secs_f64()
}

/// One accessory of a receiver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReceiverEntry {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub port: Option<PortValue>,
    /// Model shown when the receiver's description cannot be read
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntryKind {
    Switch {
        #[serde(rename = "inputID", default)]
        input_id: Option<String>,
        #[serde(rename = "pollAllInput", default)]
        poll_all_input: bool,
    },
    Television {
        #[serde(default)]
        inputs: Option<InputList>,
        #[serde(rename = "switchInfoMenu", default)]
        switch_info_menu: bool,
    },
    Volume {
        #[serde(rename = "volumeLimit", default)]
        volume_limit: Option<serde_json::Value>,
    },
}

/// `port` as written in the file: a number, a numeric string, or "auto"
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    /// The declared port, or `None` for "auto"
    pub fn declared(&self) -> ConfigResult<Option<u16>> {
        match self {
            PortValue::Number(n) => u16::try_from(*n)
                .ok()
                .filter(|port| *port != 0)
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidPort(n.to_string())),
            PortValue::Text(text) => {
                let text = text.trim();
                if text.eq_ignore_ascii_case("auto") {
                    return Ok(None);
                }
                text.parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .map(Some)
                    .ok_or_else(|| ConfigError::InvalidPort(text.to_string()))
            }
        }
    }
}

/// Television inputs: a single entry or a list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputList {
    Many(Vec<InputEntry>),
    One(InputEntry),
}

/// A television input: bare identifier or `{inputID, name}`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputEntry {
    Id(String),
    Detailed {
        #[serde(rename = "inputID", alias = "appId")]
        input_id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// A television input after sanitizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundInput {
    /// Whitespace-free identifier sent as `SI<identifier>`
    pub identifier: String,
    pub name: String,
}

impl InputEntry {
    fn bind(&self) -> Option<BoundInput> {
        let (raw, name) = match self {
            InputEntry::Id(id) => (id.as_str(), None),
            InputEntry::Detailed { input_id, name } => (input_id.as_str(), name.as_deref()),
        };

        let identifier: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if identifier.is_empty() {
            return None;
        }

        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(raw)
            .to_string();

        Some(BoundInput { identifier, name })
    }
}

impl ReceiverEntry {
    /// Port declared by this entry, `None` when absent or "auto"
    pub fn declared_port(&self) -> ConfigResult<Option<u16>> {
        match &self.port {
            Some(value) => value.declared(),
            None => Ok(None),
        }
    }

    /// Sanitized television inputs; empty for other kinds
    pub fn bound_inputs(&self) -> Vec<BoundInput> {
        match &self.kind {
            EntryKind::Television {
                inputs: Some(InputList::Many(inputs)),
                ..
            } => inputs.iter().filter_map(InputEntry::bind).collect(),
            EntryKind::Television {
                inputs: Some(InputList::One(input)),
                ..
            } => input.bind().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Volume ceiling of a dimmer entry.
    ///
    /// Missing, negative or non-numeric values mean 100; larger values clamp
    /// to 100.
    pub fn volume_limit(&self) -> u8 {
        let EntryKind::Volume {
            volume_limit: Some(value),
        } = &self.kind
        else {
            return DEFAULT_VOLUME_LIMIT;
        };

        let limit = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match limit {
            Some(limit) if limit.is_finite() && limit >= 0.0 => {
                limit.round().min(f64::from(DEFAULT_VOLUME_LIMIT)) as u8
            }
            _ => DEFAULT_VOLUME_LIMIT,
        }
    }

    /// Structural checks that do not depend on other entries
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidEntry {
                name: self.ip.clone(),
                reason: "name must not be empty".to_string(),
            });
        }
        if self.ip.trim().is_empty() {
            return Err(ConfigError::InvalidEntry {
                name: self.name.clone(),
                reason: "ip must not be empty".to_string(),
            });
        }
        self.declared_port()?;
        Ok(())
    }
}

/// All entries for one physical receiver, in file order
#[derive(Debug, Clone)]
pub struct ReceiverPlan {
    pub ip: String,
    pub entries: Vec<ReceiverEntry>,
}

impl ReceiverPlan {
    /// Model configured on any entry, used for fallback metadata
    pub fn configured_model(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| entry.model.as_deref())
    }
}

/// Timing and policy knobs shared by every receiver
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Upper bound of the random delay before the first poll
    pub max_jitter: Duration,
    pub discovery_backoff: Duration,
    pub discovery_log_interval: Duration,
    pub failure_threshold: u32,
    pub discovery_fallback: bool,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_jitter: DEFAULT_MAX_JITTER,
            discovery_backoff: DEFAULT_DISCOVERY_BACKOFF,
            discovery_log_interval: DEFAULT_DISCOVERY_LOG_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            discovery_fallback: false,
        }
    }
}

impl ReceiverSettings {
    /// A request must give up before the next tick is due
    pub fn validate(&self) -> ConfigResult<()> {
        if self.request_timeout >= self.poll_interval {
            return Err(ConfigError::TimeoutExceedsInterval {
                timeout: self.request_timeout,
                interval: self.poll_interval,
            });
        }
        Ok(())
    }
}

fn seconds(name: &str, value: f64) -> ConfigResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidEntry {
        name: name.to_string(),
        reason: format!("{} is not a valid number of seconds", value),
    })
}

impl BridgeConfig {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Validated receiver settings
    pub fn settings(&self) -> ConfigResult<ReceiverSettings> {
        let settings = ReceiverSettings {
            poll_interval: seconds("pollInterval", self.poll_interval)?,
            request_timeout: seconds("requestTimeout", self.request_timeout)?,
            discovery_fallback: self.discovery_fallback,
            ..ReceiverSettings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn discovery_window(&self) -> ConfigResult<Duration> {
        seconds("discoveryWindow", self.discovery_window)
    }

    /// Group entries by IP, keeping the order in which IPs first appear
    pub fn receiver_plans(&self) -> Vec<ReceiverPlan> {
        let mut plans: Vec<ReceiverPlan> = Vec::new();

        for entry in &self.receivers {
            let ip = entry.ip.trim();
            match plans.iter_mut().find(|plan| plan.ip == ip) {
                Some(plan) => plan.entries.push(entry.clone()),
                None => plans.push(ReceiverPlan {
                    ip: ip.to_string(),
                    entries: vec![entry.clone()],
                }),
            }
        }

        plans
    }
}
