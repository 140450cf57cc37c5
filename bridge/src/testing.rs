//! Scripted stand-ins for the vehicle service and the bus.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::{json, Value};

use leafbridge_common::{BridgeError, Credentials, RawStatus};

use crate::{
    bus::BusPublisher,
    vehicle::{StatusCheck, VehicleApi},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ok,
    Fail,
    Stale,
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "driver@example.com".to_string(),
        password: "hunter2".to_string(),
        region_code: "NNA".to_string(),
    }
}

#[derive(Debug)]
struct VehicleState {
    auth: VecDeque<Step>,
    status: VecDeque<Step>,
    climate: VecDeque<Step>,
    battery: Value,
    remote_ac: Value,
    authentications: u32,
    climate_calls: Vec<bool>,
}

/// Each call pops the next scripted step; an empty script means success.
#[derive(Debug, Clone)]
pub struct FakeVehicle {
    state: Arc<Mutex<VehicleState>>,
}

impl Default for FakeVehicle {
    fn default() -> Self {
        let battery = json!({
            "BatteryStatusRecords": {
                "BatteryStatus": {
                    "BatteryChargingStatus": "NORMAL_CHARGING",
                    "SOC": { "Value": 80 }
                },
                "PluginState": "CONNECTED"
            }
        });
        let remote_ac = json!({
            "RemoteACRecords": {
                "RemoteACOperation": "START",
                "PreAC_temp": 72
            }
        });

        Self {
            state: Arc::new(Mutex::new(VehicleState {
                auth: VecDeque::new(),
                status: VecDeque::new(),
                climate: VecDeque::new(),
                battery,
                remote_ac,
                authentications: 0,
                climate_calls: Vec::new(),
            })),
        }
    }
}

impl FakeVehicle {
    pub fn script_auth(&self, steps: Vec<Step>) {
        self.state.lock().unwrap().auth.extend(steps);
    }

    pub fn script_status(&self, steps: Vec<Step>) {
        self.state.lock().unwrap().status.extend(steps);
    }

    pub fn script_climate(&self, steps: Vec<Step>) {
        self.state.lock().unwrap().climate.extend(steps);
    }

    pub fn set_battery(&self, battery: Value) {
        self.state.lock().unwrap().battery = battery;
    }

    pub fn authentications(&self) -> u32 {
        self.state.lock().unwrap().authentications
    }

    pub fn climate_calls(&self) -> Vec<bool> {
        self.state.lock().unwrap().climate_calls.clone()
    }
}

fn transport(what: &str) -> BridgeError {
    BridgeError::Transport(format!("scripted {what} failure"))
}

impl VehicleApi for FakeVehicle {
    type Session = u32;

    async fn authenticate(&self, _credentials: &Credentials) -> Result<u32, BridgeError> {
        let mut state = self.state.lock().unwrap();
        state.authentications += 1;
        match state.auth.pop_front().unwrap_or(Step::Ok) {
            Step::Ok => Ok(state.authentications),
            _ => Err(BridgeError::Auth("scripted rejection".to_string())),
        }
    }

    async fn request_fresh_status(&self, _session: &u32) -> Result<StatusCheck, BridgeError> {
        match self.state.lock().unwrap().status.pop_front().unwrap_or(Step::Ok) {
            Step::Ok => Ok(StatusCheck::Fresh),
            Step::Stale => Ok(StatusCheck::Stale),
            Step::Fail => Err(transport("status check")),
        }
    }

    async fn fetch_battery_status(&self, _session: &u32) -> Result<RawStatus, BridgeError> {
        Ok(self.state.lock().unwrap().battery.clone())
    }

    async fn fetch_climate_status(&self, _session: &u32) -> Result<RawStatus, BridgeError> {
        Ok(self.state.lock().unwrap().remote_ac.clone())
    }

    async fn set_climate(&self, _session: &u32, on: bool) -> Result<(), BridgeError> {
        let mut state = self.state.lock().unwrap();
        state.climate_calls.push(on);
        match state.climate.pop_front().unwrap_or(Step::Ok) {
            Step::Ok => Ok(()),
            _ => Err(transport("set climate")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeBus {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    failures: Arc<Mutex<u32>>,
}

impl FakeBus {
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap() = count;
    }
}

impl BusPublisher for FakeBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BridgeError> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(BridgeError::Transport("scripted publish failure".to_string()));
        }
        drop(failures);

        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}
