use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::UnknownCommand;

/// Opaque response body from the vehicle service. Only presence checks are
/// applied to it, by [`crate::normalize`].
pub type RawStatus = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClimateCommand {
    On,
    Off,
}

impl ClimateCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl FromStr for ClimateCommand {
    type Err = UnknownCommand;

    /// Accepts exactly `ON` or `OFF`; anything else is rejected.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Flat telemetry record published on every successful poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(
        rename = "status_BatteryStatusRecords",
        skip_serializing_if = "Option::is_none"
    )]
    pub battery_status_code: Option<Value>,
    #[serde(rename = "SOC")]
    pub state_of_charge: Value,
    #[serde(rename = "isBatteryCharging")]
    pub is_charging: bool,
    #[serde(rename = "CruisingRangeAcOn", skip_serializing_if = "Option::is_none")]
    pub range_ac_on: Option<Value>,
    #[serde(rename = "CruisingRangeAcOff", skip_serializing_if = "Option::is_none")]
    pub range_ac_off: Option<Value>,
    #[serde(rename = "isPluggedin")]
    pub is_plugged_in: bool,
    #[serde(rename = "isRemoteACOn", serialize_with = "empty_when_unset")]
    pub is_climate_on: Option<bool>,
    #[serde(rename = "PreAC_temp", serialize_with = "empty_when_unset")]
    pub preconditioning_temp: Option<Value>,
}

/// Published after a climate command has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClimateConfirmation {
    #[serde(rename = "isRemoteACOn")]
    pub is_climate_on: bool,
}

impl From<ClimateCommand> for ClimateConfirmation {
    fn from(command: ClimateCommand) -> Self {
        Self {
            is_climate_on: command.is_on(),
        }
    }
}

// Downstream consumers expect "" rather than null when the climate block is missing.
fn empty_when_unset<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(inner) => inner.serialize(serializer),
        None => serializer.serialize_str(""),
    }
}
