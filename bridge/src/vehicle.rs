use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use serde_json::json;
use tracing::debug;

use leafbridge_common::{BridgeError, Credentials, RawStatus};

/// Result of asking the vehicle service to refresh its cached reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    Fresh,
    Stale,
}

/// Remote vehicle-data service.
pub trait VehicleApi: Send + Sync {
    type Session: Clone + Send + Sync;

    fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Session, BridgeError>> + Send;

    fn request_fresh_status(
        &self,
        session: &Self::Session,
    ) -> impl Future<Output = Result<StatusCheck, BridgeError>> + Send;

    fn fetch_battery_status(
        &self,
        session: &Self::Session,
    ) -> impl Future<Output = Result<RawStatus, BridgeError>> + Send;

    fn fetch_climate_status(
        &self,
        session: &Self::Session,
    ) -> impl Future<Output = Result<RawStatus, BridgeError>> + Send;

    fn set_climate(
        &self,
        session: &Self::Session,
        on: bool,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// The single cached authentication session shared by polling and commands.
#[derive(Debug)]
pub struct SessionCache<S> {
    credentials: Credentials,
    session: Option<S>,
}

impl<S: Clone> SessionCache<S> {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            session: None,
        }
    }

    pub async fn get_or_authenticate<C>(&mut self, client: &C) -> Result<S, BridgeError>
    where
        C: VehicleApi<Session = S>,
    {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        let session = client.authenticate(&self.credentials).await?;
        debug!("vehicle session established");
        self.session = Some(session.clone());
        Ok(session)
    }

    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            debug!("vehicle session invalidated");
        }
    }

    #[cfg(test)]
    pub fn is_cached(&self) -> bool {
        self.session.is_some()
    }
}

/// Stand-in vehicle service used by the host binary.
///
/// Produces plausible battery and climate readings so the scheduler, bus and
/// HTTP surface can be exercised without a real account.
#[derive(Debug, Clone, Default)]
pub struct SimulatedVehicle {
    tick: Arc<AtomicU64>,
    climate_on: Arc<AtomicBool>,
}

impl SimulatedVehicle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VehicleApi for SimulatedVehicle {
    type Session = u64;

    async fn authenticate(&self, credentials: &Credentials) -> Result<u64, BridgeError> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(BridgeError::Auth("empty credentials".to_string()));
        }
        Ok(self.tick.load(Ordering::Relaxed))
    }

    async fn request_fresh_status(&self, _session: &u64) -> Result<StatusCheck, BridgeError> {
        self.tick.fetch_add(1, Ordering::Relaxed);
        Ok(StatusCheck::Fresh)
    }

    async fn fetch_battery_status(&self, _session: &u64) -> Result<RawStatus, BridgeError> {
        let tick = self.tick.load(Ordering::Relaxed);
        let soc = 40 + (tick % 12) * 5;
        let (charging_status, plug_state) = if tick % 4 != 0 {
            ("NORMAL_CHARGING", "CONNECTED")
        } else {
            ("NOT_CHARGING", "NOT_CONNECTED")
        };

        Ok(json!({
            "status": 200,
            "BatteryStatusRecords": {
                "BatteryStatus": {
                    "BatteryChargingStatus": charging_status,
                    "SOC": { "Value": soc }
                },
                "PluginState": plug_state,
                "CruisingRangeAcOn": soc * 1_400,
                "CruisingRangeAcOff": soc * 1_600
            }
        }))
    }

    async fn fetch_climate_status(&self, _session: &u64) -> Result<RawStatus, BridgeError> {
        let operation = if self.climate_on.load(Ordering::Relaxed) {
            "START"
        } else {
            "STOP"
        };

        Ok(json!({
            "status": 200,
            "RemoteACRecords": {
                "RemoteACOperation": operation,
                "PreAC_temp": 72
            }
        }))
    }

    async fn set_climate(&self, _session: &u64, on: bool) -> Result<(), BridgeError> {
        self.climate_on.store(on, Ordering::Relaxed);
        Ok(())
    }
}
