use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;
use tracing::{error, info, warn};

use leafbridge_common::{
    AttemptOutcome, BridgeError, ClimateCommand, ClimateConfirmation, CommandAttempt,
    SchedulerConfig,
};

use crate::{bridge::Upstream, bus::BusPublisher, vehicle::VehicleApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Applied(ClimateCommand),
    Retrying(Duration),
    Exhausted,
}

#[derive(Debug)]
struct RetryChain {
    attempt: CommandAttempt,
    retry_at: Option<Instant>,
}

/// Applies climate commands with bounded retry, one chain per device.
#[derive(Debug)]
pub struct CommandCoordinator {
    config: SchedulerConfig,
    chains: HashMap<String, RetryChain>,
}

impl CommandCoordinator {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            config: config.clone(),
            chains: HashMap::new(),
        }
    }

    /// Parses an inbound payload and starts a new chain for the device,
    /// cancelling any chain still waiting to retry. Unrecognized payloads are
    /// logged and ignored.
    pub fn accept(&mut self, device_id: &str, payload: &str) -> Option<ClimateCommand> {
        let command = match payload.parse::<ClimateCommand>() {
            Ok(command) => command,
            Err(err) => {
                warn!("ignoring command for {device_id}: {err}");
                return None;
            }
        };

        let chain = RetryChain {
            attempt: CommandAttempt::new(command, &self.config),
            retry_at: None,
        };
        if let Some(previous) = self.chains.insert(device_id.to_string(), chain) {
            info!(
                "climate {} for {device_id} supersedes pending {} after {} failed attempt(s)",
                command.as_str(),
                previous.attempt.desired().as_str(),
                previous.attempt.attempt_count()
            );
        } else {
            info!("climate {} requested for {device_id}", command.as_str());
        }

        Some(command)
    }

    /// Earliest pending retry across all devices.
    pub fn next_retry(&self) -> Option<Instant> {
        self.chains.values().filter_map(|chain| chain.retry_at).min()
    }

    /// Devices whose retry deadline has passed.
    pub fn due(&self, now: Instant) -> Vec<String> {
        self.chains
            .iter()
            .filter(|(_, chain)| chain.retry_at.is_some_and(|at| at <= now))
            .map(|(device_id, _)| device_id.clone())
            .collect()
    }

    pub fn active(&self) -> impl Iterator<Item = (&String, &CommandAttempt)> {
        self.chains
            .iter()
            .map(|(device_id, chain)| (device_id, &chain.attempt))
    }

    /// Runs one attempt of the device's chain. Returns `None` when the device
    /// has no chain.
    pub async fn attempt<C, B>(
        &mut self,
        device_id: &str,
        upstream: &mut Upstream<C, B>,
    ) -> Option<CommandResult>
    where
        C: VehicleApi,
        B: BusPublisher,
    {
        let chain = self.chains.get_mut(device_id)?;
        chain.retry_at = None;
        chain.attempt.begin();

        // Commands usually fail on an expired session, so every attempt starts fresh.
        upstream.session.invalidate();

        let desired = chain.attempt.desired();
        let result = match apply(&mut chain.attempt, upstream).await {
            Ok(()) => {
                chain.attempt.record_success();
                info!("climate {} applied for {device_id}", desired.as_str());
                confirm(desired, upstream).await;
                CommandResult::Applied(desired)
            }
            Err(err) => {
                upstream.session.invalidate();
                match chain.attempt.record_failure() {
                    AttemptOutcome::Retry(delay) => {
                        warn!(
                            "climate {} for {device_id} failed ({err}); retry #{} in {}s",
                            desired.as_str(),
                            chain.attempt.attempt_count(),
                            delay.as_secs()
                        );
                        chain.retry_at = Some(Instant::now() + delay);
                        CommandResult::Retrying(delay)
                    }
                    AttemptOutcome::Exhausted => {
                        error!(
                            "climate {} for {device_id} failed ({err}); giving up after {} attempts",
                            desired.as_str(),
                            chain.attempt.max_attempts()
                        );
                        CommandResult::Exhausted
                    }
                }
            }
        };

        if chain.attempt.is_terminal() {
            self.chains.remove(device_id);
        }
        Some(result)
    }
}

async fn apply<C, B>(
    attempt: &mut CommandAttempt,
    upstream: &mut Upstream<C, B>,
) -> Result<(), BridgeError>
where
    C: VehicleApi,
    B: BusPublisher,
{
    let session = upstream.session.get_or_authenticate(&upstream.client).await?;
    attempt.authenticated();
    upstream
        .client
        .set_climate(&session, attempt.desired().is_on())
        .await
}

// The vehicle already holds the new state, so a lost confirmation is not retried.
async fn confirm<C, B>(command: ClimateCommand, upstream: &Upstream<C, B>)
where
    C: VehicleApi,
    B: BusPublisher,
{
    if let Err(err) = upstream.publish_json(&ClimateConfirmation::from(command)).await {
        warn!("climate confirmation publish failed: {err}");
    }
}
