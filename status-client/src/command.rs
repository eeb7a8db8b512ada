//! Control codes accepted by the receiver's command endpoints

/// Path of the status query
pub const STATUS_PATH: &str = "/goform/formMainZone_MainZoneXmlStatusLite.xml";

/// Path accepting power commands
pub const POWER_PATH: &str = "/goform/formiPhoneAppPower.xml";

/// Path accepting every other control code
pub const DIRECT_PATH: &str = "/goform/formiPhoneAppDirect.xml";

/// Highest `MV` level the firmware accepts (+18 dB)
pub const MAX_DEVICE_VOLUME: u8 = 98;

/// A command understood by the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PowerOn,
    PowerStandby,
    /// `SI<input>`
    SelectInput(String),
    VolumeUp,
    VolumeDown,
    /// `MV<level>` on the 0..=98 device scale
    SetVolume(u8),
    MuteOn,
    MuteOff,
    /// Raw control code such as `MNCUP`
    Direct(String),
}

impl Command {
    /// The control code as the device documents it, before encoding
    pub fn code(&self) -> String {
        match self {
            Command::PowerOn => "1+PowerOn".to_string(),
            Command::PowerStandby => "1+PowerStandby".to_string(),
            Command::SelectInput(input) => format!("SI{}", input),
            Command::VolumeUp => "MVUP".to_string(),
            Command::VolumeDown => "MVDOWN".to_string(),
            Command::SetVolume(level) => format!("MV{:02}", level.min(&MAX_DEVICE_VOLUME)),
            Command::MuteOn => "MUON".to_string(),
            Command::MuteOff => "MUOFF".to_string(),
            Command::Direct(code) => code.clone(),
        }
    }

    /// Request path plus encoded query string
    pub fn path_and_query(&self) -> String {
        let path = match self {
            Command::PowerOn | Command::PowerStandby => POWER_PATH,
            _ => DIRECT_PATH,
        };
        format!("{}?{}", path, encode_code(&self.code()))
    }
}

/// Escape a control code for the query string.
///
/// Firmware treats a literal `/` as a path separator, so input names such as
/// `SAT/CBL` must go out as `SAT%2FCBL`. `+` is left alone since the power
/// endpoint uses it as a separator.
pub fn encode_code(code: &str) -> String {
    let mut encoded = String::with_capacity(code.len());
    for c in code.chars() {
        match c {
            '/' => encoded.push_str("%2F"),
            ' ' => encoded.push_str("%20"),
            '%' => encoded.push_str("%25"),
            '&' => encoded.push_str("%26"),
            '#' => encoded.push_str("%23"),
            _ => encoded.push(c),
        }
    }
    encoded
}
