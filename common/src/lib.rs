pub mod backoff;
pub mod config;
pub mod error;
pub mod normalize;
pub mod retry;
pub mod topics;
pub mod types;

pub use backoff::PollBackoff;
pub use config::{BridgeConfig, Credentials, MqttConfig, SchedulerConfig};
pub use error::{BridgeError, ConfigError, UnknownCommand};
pub use normalize::normalize;
pub use retry::{AttemptOutcome, CommandAttempt, CommandPhase};
pub use topics::*;
pub use types::{ClimateCommand, ClimateConfirmation, RawStatus, TelemetryRecord};
