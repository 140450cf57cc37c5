use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use leafbridge_common::{normalize, BridgeError, PollBackoff, SchedulerConfig, TelemetryRecord};

use crate::{
    bridge::Upstream,
    bus::BusPublisher,
    vehicle::{StatusCheck, VehicleApi},
};

/// Owns the repeating poll cycle: its backoff state and the one pending poll deadline.
#[derive(Debug)]
pub struct PollScheduler {
    backoff: PollBackoff,
    next_poll: Instant,
    last_error: Option<BridgeError>,
}

impl PollScheduler {
    /// The first poll is due immediately.
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            backoff: PollBackoff::new(config),
            next_poll: Instant::now(),
            last_error: None,
        }
    }

    pub fn next_poll(&self) -> Instant {
        self.next_poll
    }

    pub fn backoff(&self) -> &PollBackoff {
        &self.backoff
    }

    pub fn last_error(&self) -> Option<&BridgeError> {
        self.last_error.as_ref()
    }

    /// Replaces the pending poll deadline.
    pub fn schedule_in(&mut self, delay: Duration) -> Instant {
        self.next_poll = Instant::now() + delay;
        self.next_poll
    }

    /// Moves the pending poll earlier if it is due later than `delay` from now.
    pub fn schedule_no_later_than(&mut self, delay: Duration) -> Instant {
        self.next_poll = self.next_poll.min(Instant::now() + delay);
        self.next_poll
    }

    /// Runs one full cycle and schedules the next. Errors stop here.
    pub async fn poll<C, B>(&mut self, upstream: &mut Upstream<C, B>) -> Option<TelemetryRecord>
    where
        C: VehicleApi,
        B: BusPublisher,
    {
        match poll_once(upstream).await {
            Ok(record) => {
                let delay = self.backoff.on_success();
                self.last_error = None;
                self.schedule_in(delay);
                info!("telemetry published; next poll in {}s", delay.as_secs());
                Some(record)
            }
            Err(err) => {
                upstream.session.invalidate();
                let delay = self.backoff.on_failure();
                warn!(
                    "poll failed ({}): {err}; retrying in {}ms (failure #{})",
                    err.kind(),
                    delay.as_millis(),
                    self.backoff.consecutive_failures()
                );
                self.last_error = Some(err);
                self.schedule_in(delay);
                None
            }
        }
    }
}

/// authenticate-or-reuse, request fresh status, fetch, normalize, publish.
async fn poll_once<C, B>(upstream: &mut Upstream<C, B>) -> Result<TelemetryRecord, BridgeError>
where
    C: VehicleApi,
    B: BusPublisher,
{
    let session = upstream.session.get_or_authenticate(&upstream.client).await?;

    if upstream.client.request_fresh_status(&session).await? == StatusCheck::Stale {
        return Err(BridgeError::StaleData);
    }

    let (battery, climate) = tokio::try_join!(
        upstream.client.fetch_battery_status(&session),
        upstream.client.fetch_climate_status(&session),
    )?;

    let record = normalize(&battery, &climate)?;
    upstream.publish_json(&record).await?;
    Ok(record)
}
