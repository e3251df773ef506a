//! Projector control commands.
//!
//! Each [`Command`] names one controllable parameter of the projector and
//! renders to a single wire request frame. Query commands carry a `?`
//! argument; set commands carry the value token the device expects. The
//! mapping from replies back to typed values lives in [`crate::client`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::wire::Request;

/// Picture ("application") modes supported by the `appmod` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PictureMode {
    /// Maximum light output, washed-out colors.
    Bright,
    /// Balanced mode for slides and spreadsheets.
    #[serde(rename = "preset")]
    Presentation,
    /// sRGB-calibrated color.
    Srgb,
    /// Film mode.
    #[serde(rename = "cine")]
    Cinema,
    /// Low-latency mode.
    Game,
    /// First user-stored calibration.
    User1,
    /// Second user-stored calibration.
    User2,
}

impl PictureMode {
    /// The token used for this mode on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            PictureMode::Bright => "bright",
            PictureMode::Presentation => "preset",
            PictureMode::Srgb => "srgb",
            PictureMode::Cinema => "cine",
            PictureMode::Game => "game",
            PictureMode::User1 => "user1",
            PictureMode::User2 => "user2",
        }
    }
}

impl FromStr for PictureMode {
    type Err = UnknownToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bright" => Ok(PictureMode::Bright),
            "preset" => Ok(PictureMode::Presentation),
            "srgb" => Ok(PictureMode::Srgb),
            "cine" => Ok(PictureMode::Cinema),
            "game" => Ok(PictureMode::Game),
            "user1" => Ok(PictureMode::User1),
            "user2" => Ok(PictureMode::User2),
            _ => Err(UnknownToken(s.to_string())),
        }
    }
}

impl fmt::Display for PictureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// A mode or direction token the device does not define.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown token: {0:?}")]
pub struct UnknownToken(pub String);

/// Direction for stepped adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// The token used on the wire: `+` steps up, `-` steps down.
    pub fn token(&self) -> &'static str {
        match self {
            Direction::Up => "+",
            Direction::Down => "-",
        }
    }
}

/// Projector control commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Command {
    /// Get the raw power reading.
    GetPower,
    /// Set the power state (`true` is on, `false` is standby).
    SetPower(bool),
    /// Get the current volume level.
    GetVolume,
    /// Set the volume level.
    SetVolume(u8),
    /// Get the internal temperature in degrees Celsius.
    GetTemperature,
    /// Get the cooling fan speed in rpm.
    GetFanSpeed,
    /// Get the accumulated lamp usage in hours.
    GetLampHours,
    /// Get the active picture mode.
    GetPictureMode,
    /// Set the picture mode.
    SetPictureMode(PictureMode),
    /// Get the brightness setting.
    GetBrightness,
    /// Set the brightness setting.
    SetBrightness(u8),
    /// Step the brightness up or down by one unit.
    StepBrightness(Direction),
    /// Get the contrast setting.
    GetContrast,
    /// Set the contrast setting.
    SetContrast(u8),
    /// Get the sharpness setting.
    GetSharpness,
    /// Set the sharpness setting.
    SetSharpness(u8),
}

impl Command {
    /// The wire key this command addresses. Replies echo the same key.
    pub fn key(&self) -> &'static str {
        match self {
            Command::GetPower | Command::SetPower(_) => "pow",
            Command::GetVolume | Command::SetVolume(_) => "vol",
            Command::GetTemperature => "tmp",
            Command::GetFanSpeed => "fan",
            Command::GetLampHours => "ltim",
            Command::GetPictureMode | Command::SetPictureMode(_) => "appmod",
            Command::GetBrightness | Command::SetBrightness(_) | Command::StepBrightness(_) => {
                "bri"
            }
            Command::GetContrast | Command::SetContrast(_) => "con",
            Command::GetSharpness | Command::SetSharpness(_) => "sha",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPower(val) => write!(f, "SetPower({})", val),
            Command::SetVolume(val) => write!(f, "SetVolume({})", val),
            Command::SetPictureMode(mode) => write!(f, "SetPictureMode({})", mode),
            Command::SetBrightness(val) => write!(f, "SetBrightness({})", val),
            Command::StepBrightness(Direction::Up) => write!(f, "StepBrightness(up)"),
            Command::StepBrightness(Direction::Down) => write!(f, "StepBrightness(down)"),
            Command::SetContrast(val) => write!(f, "SetContrast({})", val),
            Command::SetSharpness(val) => write!(f, "SetSharpness({})", val),
            variant => write!(f, "{:?}", variant),
        }
    }
}

impl From<Command> for Request {
    fn from(val: Command) -> Self {
        match val {
            Command::GetPower => Request::query("pow"),
            Command::SetPower(true) => Request::set("pow", "on"),
            Command::SetPower(false) => Request::set("pow", "off"),
            Command::GetVolume => Request::query("vol"),
            Command::SetVolume(level) => Request::set("vol", level.to_string()),
            Command::GetTemperature => Request::query("tmp"),
            Command::GetFanSpeed => Request::query("fan"),
            Command::GetLampHours => Request::query("ltim"),
            Command::GetPictureMode => Request::query("appmod"),
            Command::SetPictureMode(mode) => Request::set("appmod", mode.token()),
            Command::GetBrightness => Request::query("bri"),
            Command::SetBrightness(value) => Request::set("bri", value.to_string()),
            Command::StepBrightness(direction) => Request::set("bri", direction.token()),
            Command::GetContrast => Request::query("con"),
            Command::SetContrast(value) => Request::set("con", value.to_string()),
            Command::GetSharpness => Request::query("sha"),
            Command::SetSharpness(value) => Request::set("sha", value.to_string()),
        }
    }
}

// =================================================================
// Tests
