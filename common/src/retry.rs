use std::time::Duration;

use serde::Serialize;

use crate::{config::SchedulerConfig, types::ClimateCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandPhase {
    Authenticating,
    Applying,
    Retrying,
    Succeeded,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Retry(Duration),
    Exhausted,
}

/// Bounded retry state for one inbound climate command.
#[derive(Debug, Clone)]
pub struct CommandAttempt {
    desired: ClimateCommand,
    attempt_count: u32,
    max_attempts: u32,
    retry_delay: Duration,
    phase: CommandPhase,
}

impl CommandAttempt {
    pub fn new(desired: ClimateCommand, config: &SchedulerConfig) -> Self {
        Self {
            desired,
            attempt_count: 0,
            max_attempts: config.max_command_attempts.max(1),
            retry_delay: config.command_retry_delay(),
            phase: CommandPhase::Authenticating,
        }
    }

    pub fn desired(&self) -> ClimateCommand {
        self.desired
    }

    /// Number of failed attempts so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn phase(&self) -> CommandPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, CommandPhase::Succeeded | CommandPhase::Exhausted)
    }

    pub fn begin(&mut self) {
        self.phase = CommandPhase::Authenticating;
    }

    pub fn authenticated(&mut self) {
        self.phase = CommandPhase::Applying;
    }

    pub fn record_success(&mut self) {
        self.phase = CommandPhase::Succeeded;
    }

    pub fn record_failure(&mut self) -> AttemptOutcome {
        self.attempt_count = self.attempt_count.saturating_add(1);
        if self.attempt_count < self.max_attempts {
            self.phase = CommandPhase::Retrying;
            AttemptOutcome::Retry(self.retry_delay)
        } else {
            self.phase = CommandPhase::Exhausted;
            AttemptOutcome::Exhausted
        }
    }
}
