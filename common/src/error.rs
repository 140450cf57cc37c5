use thiserror::Error;

/// Failures of a single poll cycle or command attempt.
///
/// None of these are fatal to the process: the poll scheduler folds them into
/// its backoff interval and the command coordinator into its attempt counter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream returned cached rather than fresh telemetry")]
    StaleData,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("could not encode bus payload: {0}")]
    Encode(String),
}

impl BridgeError {
    /// Short label used in logs and the status endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::StaleData => "stale_data",
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Encode(_) => "encode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config incomplete: `{0}` is required")]
    Missing(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized climate command {0:?}")]
pub struct UnknownCommand(pub String);
