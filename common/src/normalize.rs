use serde_json::{Map, Value};

use crate::{
    error::BridgeError,
    types::{RawStatus, TelemetryRecord},
};

const NOT_CHARGING: &str = "NOT_CHARGING";
const NOT_CONNECTED: &str = "NOT_CONNECTED";
const CLIMATE_STOPPED: &str = "STOP";

/// Flattens the battery and climate responses into one telemetry record.
///
/// The battery block is mandatory down to the state-of-charge value. A missing
/// or non-object climate block is tolerated and leaves the climate fields unset.
pub fn normalize(battery: &RawStatus, climate: &RawStatus) -> Result<TelemetryRecord, BridgeError> {
    let records = object_at(battery, "BatteryStatusRecords")?;
    let status = records
        .get("BatteryStatus")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("BatteryStatusRecords.BatteryStatus"))?;
    let state_of_charge = status
        .get("SOC")
        .and_then(Value::as_object)
        .and_then(|soc| soc.get("Value"))
        .filter(|value| !value.is_null())
        .cloned()
        .ok_or_else(|| malformed("BatteryStatusRecords.BatteryStatus.SOC.Value"))?;

    let is_charging = status
        .get("BatteryChargingStatus")
        .and_then(Value::as_str)
        != Some(NOT_CHARGING);
    let is_plugged_in = records.get("PluginState").and_then(Value::as_str) != Some(NOT_CONNECTED);

    let (is_climate_on, preconditioning_temp) =
        match climate.get("RemoteACRecords").and_then(Value::as_object) {
            Some(remote) => (
                Some(
                    remote.get("RemoteACOperation").and_then(Value::as_str)
                        != Some(CLIMATE_STOPPED),
                ),
                present(remote, "PreAC_temp"),
            ),
            None => (None, None),
        };

    Ok(TelemetryRecord {
        battery_status_code: battery.get("status").filter(|value| !value.is_null()).cloned(),
        state_of_charge,
        is_charging,
        range_ac_on: present(records, "CruisingRangeAcOn"),
        range_ac_off: present(records, "CruisingRangeAcOff"),
        is_plugged_in,
        is_climate_on,
        preconditioning_temp,
    })
}

fn object_at<'a>(
    value: &'a Value,
    key: &'static str,
) -> Result<&'a Map<String, Value>, BridgeError> {
    value
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(key))
}

fn present(map: &Map<String, Value>, key: &str) -> Option<Value> {
    map.get(key).filter(|value| !value.is_null()).cloned()
}

fn malformed(path: &str) -> BridgeError {
    BridgeError::MalformedResponse(format!("missing `{path}`"))
}
