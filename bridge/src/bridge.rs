use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex},
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use leafbridge_common::{BridgeError, Credentials, SchedulerConfig};

use crate::{
    bus::BusPublisher,
    coordinator::{CommandCoordinator, CommandResult},
    scheduler::PollScheduler,
    status::{BridgeStatus, CommandView},
    vehicle::{SessionCache, VehicleApi},
};

pub type SharedStatus = Arc<Mutex<BridgeStatus>>;

/// A climate command as it arrived from the bus or the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub device_id: String,
    pub payload: String,
}

/// Vehicle client, its cached session and the bus, shared by polling and commands.
pub struct Upstream<C: VehicleApi, B: BusPublisher> {
    pub client: C,
    pub session: SessionCache<C::Session>,
    pub bus: B,
    telemetry_topic: String,
}

impl<C: VehicleApi, B: BusPublisher> Upstream<C, B> {
    pub fn new(
        client: C,
        bus: B,
        credentials: Credentials,
        telemetry_topic: impl Into<String>,
    ) -> Self {
        Self {
            client,
            session: SessionCache::new(credentials),
            bus,
            telemetry_topic: telemetry_topic.into(),
        }
    }

    pub async fn publish_json<T: Serialize>(&self, value: &T) -> Result<(), BridgeError> {
        let payload = serde_json::to_vec(value)
            .map_err(|err| BridgeError::Encode(err.to_string()))?;
        self.bus.publish(&self.telemetry_topic, payload).await
    }
}

/// Single owner of all scheduling state. Timer expiries and inbound commands
/// are handled one at a time on the task that runs [`Bridge::run`].
pub struct Bridge<C: VehicleApi, B: BusPublisher> {
    upstream: Upstream<C, B>,
    scheduler: PollScheduler,
    coordinator: CommandCoordinator,
    revalidate_after_command: Option<Duration>,
    status: SharedStatus,
}

impl<C: VehicleApi, B: BusPublisher> Bridge<C, B> {
    pub fn new(upstream: Upstream<C, B>, config: &SchedulerConfig, status: SharedStatus) -> Self {
        let mut config = config.clone();
        config.sanitize();

        Self {
            upstream,
            scheduler: PollScheduler::new(&config),
            coordinator: CommandCoordinator::new(&config),
            revalidate_after_command: config.revalidate_after_command(),
            status,
        }
    }

    /// Polls immediately, then keeps polling and serving commands until the
    /// command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<InboundCommand>) {
        info!("bridge started");

        loop {
            let retry_at = self.coordinator.next_retry();

            tokio::select! {
                _ = time::sleep_until(self.scheduler.next_poll()) => {
                    self.poll().await;
                }
                inbound = commands.recv() => match inbound {
                    Some(command) => self.on_command(command).await,
                    None => {
                        info!("command channel closed; bridge stopping");
                        return;
                    }
                },
                _ = sleep_until_some(retry_at) => {
                    self.retry_due().await;
                }
            }
        }
    }

    pub(crate) async fn poll(&mut self) {
        let record = self.scheduler.poll(&mut self.upstream).await;

        let mut status = self.status.lock().await;
        if let Some(record) = record {
            status.last_record = Some(record);
            status.last_published_at = Some(Utc::now());
        }
        self.fill_schedule(&mut status);
    }

    pub(crate) async fn on_command(&mut self, command: InboundCommand) {
        if self
            .coordinator
            .accept(&command.device_id, &command.payload)
            .is_none()
        {
            return;
        }

        let result = self
            .coordinator
            .attempt(&command.device_id, &mut self.upstream)
            .await;
        self.after_attempt(result).await;
    }

    pub(crate) async fn retry_due(&mut self) {
        for device_id in self.coordinator.due(Instant::now()) {
            let result = self.coordinator.attempt(&device_id, &mut self.upstream).await;
            self.after_attempt(result).await;
        }
    }

    async fn after_attempt(&mut self, result: Option<CommandResult>) {
        match result {
            Some(CommandResult::Applied(command)) => {
                if let Some(delay) = self.revalidate_after_command {
                    let due = self.scheduler.schedule_no_later_than(delay);
                    debug!(
                        "revalidation poll for {} in {}s",
                        command.as_str(),
                        due.saturating_duration_since(Instant::now()).as_secs()
                    );
                }
            }
            Some(CommandResult::Retrying(delay)) => {
                debug!("next command attempt in {}s", delay.as_secs());
            }
            Some(CommandResult::Exhausted) | None => {}
        }

        let mut status = self.status.lock().await;
        self.fill_schedule(&mut status);
    }

    fn fill_schedule(&self, status: &mut BridgeStatus) {
        let backoff = self.scheduler.backoff();
        status.consecutive_failures = backoff.consecutive_failures();
        status.backoff_ms = backoff.current().as_millis() as u64;
        status.next_poll_in_ms = self
            .scheduler
            .next_poll()
            .saturating_duration_since(Instant::now())
            .as_millis() as u64;
        status.last_error = self.scheduler.last_error().map(ToString::to_string);
        status.last_error_kind = self.scheduler.last_error().map(BridgeError::kind);
        status.commands = self
            .coordinator
            .active()
            .map(|(device_id, attempt)| CommandView::new(device_id, attempt))
            .collect();
    }

    #[cfg(test)]
    pub(crate) fn upstream(&self) -> &Upstream<C, B> {
        &self.upstream
    }

    #[cfg(test)]
    pub(crate) fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Forwards a command into the bridge, logging if the bridge is gone.
pub async fn forward_command(
    commands: &mpsc::Sender<InboundCommand>,
    command: InboundCommand,
) -> bool {
    match commands.send(command).await {
        Ok(()) => true,
        Err(err) => {
            warn!("bridge is not accepting commands: {err}");
            false
        }
    }
}
