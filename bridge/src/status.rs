use chrono::{DateTime, Utc};
use serde::Serialize;

use leafbridge_common::{ClimateCommand, CommandAttempt, CommandPhase, TelemetryRecord};

#[derive(Debug, Clone, Serialize)]
pub struct CommandView {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub desired: ClimateCommand,
    pub phase: CommandPhase,
    #[serde(rename = "failedAttempts")]
    pub failed_attempts: u32,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: u32,
}

impl CommandView {
    pub fn new(device_id: &str, attempt: &CommandAttempt) -> Self {
        Self {
            device_id: device_id.to_string(),
            desired: attempt.desired(),
            phase: attempt.phase(),
            failed_attempts: attempt.attempt_count(),
            max_attempts: attempt.max_attempts(),
        }
    }
}

/// Snapshot of the bridge served by `GET /api/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStatus {
    #[serde(rename = "lastRecord")]
    pub last_record: Option<TelemetryRecord>,
    #[serde(rename = "lastPublishedAt")]
    pub last_published_at: Option<DateTime<Utc>>,
    #[serde(rename = "consecutiveFailures")]
    pub consecutive_failures: u32,
    #[serde(rename = "backoffMs")]
    pub backoff_ms: u64,
    #[serde(rename = "nextPollInMs")]
    pub next_poll_in_ms: u64,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
    #[serde(rename = "lastErrorKind")]
    pub last_error_kind: Option<&'static str>,
    pub commands: Vec<CommandView>,
}
