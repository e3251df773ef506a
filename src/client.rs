//! Typed operations over the device link.
//!
//! One async method per controllable parameter. Each method renders its
//! [`Command`] to a request frame, runs a single link exchange, and decodes
//! the reply line into a typed value. Failures keep their class: link
//! problems arrive as [`CommandError::Link`], unparseable replies as
//! [`CommandError::Protocol`], and device declines (`Block item` and
//! friends) as [`CommandError::Rejected`]. The one deliberate exception is
//! [`ProjectorClient::power_status`], where a blocked reply means "no
//! meaningful answer right now" and maps to `Ok(None)` rather than an error.

use std::str::FromStr;

use log::debug;
use serde::Serialize;

use crate::commands::{Command, Direction, PictureMode};
use crate::error::{CommandError, Result};
use crate::link::DeviceLink;
use crate::wire::Reply;

/// The three picture settings, fetched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PictureSettings {
    pub brightness: u8,
    pub contrast: u8,
    pub sharpness: u8,
}

/// Typed command client for a single projector.
///
/// Cheap to clone; all clones share the same underlying link, whose task
/// serializes their exchanges.
#[derive(Debug, Clone)]
pub struct ProjectorClient {
    link: DeviceLink,
}

impl ProjectorClient {
    pub fn new(link: DeviceLink) -> ProjectorClient {
        ProjectorClient { link }
    }

    // --------------------------------------------------------------------------------------------
    // Power

    /// Reads the raw power state.
    ///
    /// `Ok(None)` means the device replied but did not answer meaningfully
    /// (it blocks the query mid-transition). That is not the same as "off".
    pub async fn power_status(&self) -> Result<Option<bool>> {
        let reply = self.run(Command::GetPower).await?;

        match &reply {
            Reply::Blocked => Ok(None),
            Reply::Value { .. } => {
                let value = reply.value_for("pow").ok_or_else(|| {
                    CommandError::Protocol(format!("reply for wrong key: {reply}"))
                })?;

                match value.to_ascii_uppercase().as_str() {
                    "ON" => Ok(Some(true)),
                    "OFF" => Ok(Some(false)),
                    other => Err(CommandError::Protocol(format!(
                        "unexpected power value: {other:?}"
                    ))),
                }
            }
            other => Err(CommandError::Rejected(other.to_string())),
        }
    }

    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.apply(Command::SetPower(on)).await
    }

    // --------------------------------------------------------------------------------------------
    // Readings

    pub async fn volume(&self) -> Result<u8> {
        let value = self.fetch(Command::GetVolume).await?;
        parse_number(&value, "volume")
    }

    /// Internal temperature in degrees Celsius.
    pub async fn temperature(&self) -> Result<u16> {
        let value = self.fetch(Command::GetTemperature).await?;
        parse_number(&value, "temperature")
    }

    /// Cooling fan speed in rpm.
    pub async fn fan_speed(&self) -> Result<u16> {
        let value = self.fetch(Command::GetFanSpeed).await?;
        parse_number(&value, "fan speed")
    }

    /// Accumulated lamp usage in hours.
    pub async fn lamp_hours(&self) -> Result<u32> {
        let value = self.fetch(Command::GetLampHours).await?;
        parse_number(&value, "lamp hours")
    }

    pub async fn picture_mode(&self) -> Result<PictureMode> {
        let value = self.fetch(Command::GetPictureMode).await?;
        PictureMode::from_str(&value)
            .map_err(|_| CommandError::Protocol(format!("unknown picture mode: {value:?}")))
    }

    pub async fn brightness(&self) -> Result<u8> {
        let value = self.fetch(Command::GetBrightness).await?;
        parse_number(&value, "brightness")
    }

    pub async fn contrast(&self) -> Result<u8> {
        let value = self.fetch(Command::GetContrast).await?;
        parse_number(&value, "contrast")
    }

    pub async fn sharpness(&self) -> Result<u8> {
        let value = self.fetch(Command::GetSharpness).await?;
        parse_number(&value, "sharpness")
    }

    /// Fetches brightness, contrast, and sharpness in one pass (three
    /// exchanges back to back on the link).
    pub async fn picture_settings(&self) -> Result<PictureSettings> {
        Ok(PictureSettings {
            brightness: self.brightness().await?,
            contrast: self.contrast().await?,
            sharpness: self.sharpness().await?,
        })
    }

    // --------------------------------------------------------------------------------------------
    // Settings

    pub async fn set_volume(&self, level: u8) -> Result<()> {
        self.apply(Command::SetVolume(level)).await
    }

    pub async fn set_picture_mode(&self, mode: PictureMode) -> Result<()> {
        self.apply(Command::SetPictureMode(mode)).await
    }

    pub async fn set_brightness(&self, value: u8) -> Result<()> {
        self.apply(Command::SetBrightness(value)).await
    }

    /// Steps brightness one unit up or down.
    pub async fn step_brightness(&self, direction: Direction) -> Result<()> {
        self.apply(Command::StepBrightness(direction)).await
    }

    pub async fn set_contrast(&self, value: u8) -> Result<()> {
        self.apply(Command::SetContrast(value)).await
    }

    pub async fn set_sharpness(&self, value: u8) -> Result<()> {
        self.apply(Command::SetSharpness(value)).await
    }

    // --------------------------------------------------------------------------------------------
    // Private

    /// Runs one exchange and parses the reply line.
    async fn run(&self, command: Command) -> Result<Reply> {
        debug!("Issuing {command}");

        let line = self.link.exchange(command.into()).await?;

        Reply::parse(&line).map_err(|e| CommandError::Protocol(e.to_string()))
    }

    /// Runs a query and returns the value the device echoed for its key.
    async fn fetch(&self, command: Command) -> Result<String> {
        let key = command.key();
        let reply = self.run(command).await?;

        match &reply {
            Reply::Value { .. } => reply
                .value_for(key)
                .map(str::to_string)
                .ok_or_else(|| CommandError::Protocol(format!("reply for wrong key: {reply}"))),
            other => Err(CommandError::Rejected(other.to_string())),
        }
    }

    /// Runs a set command; any echo for the same key counts as the ack.
    async fn apply(&self, command: Command) -> Result<()> {
        let key = command.key();
        let reply = self.run(command).await?;

        match &reply {
            Reply::Value { .. } if reply.value_for(key).is_some() => Ok(()),
            Reply::Value { .. } => Err(CommandError::Protocol(format!(
                "ack for wrong key: {reply}"
            ))),
            other => Err(CommandError::Rejected(other.to_string())),
        }
    }
}

fn parse_number<T: FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CommandError::Protocol(format!("{what} reply not numeric: {value:?}")))
}

// =================================================================
// Tests
