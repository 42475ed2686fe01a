use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session bootstrap failed: {0}")]
    Session(#[from] SessionError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Date/time parsing error: {0}")]
    DateTimeParse(String),

    #[error("Log setup error: {0}")]
    LogSetup(String),
}

impl AppError {
    /// Create a configuration error with context
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a date/time parsing error with context
    pub fn datetime_parse_error(msg: impl Into<String>) -> Self {
        Self::DateTimeParse(msg.into())
    }

    /// Create a log setup error with context
    pub fn log_setup_error(msg: impl Into<String>) -> Self {
        Self::LogSetup(msg.into())
    }

    /// True when the error aborts a whole batch rather than a single date.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, AppError::Session(_) | AppError::Config(_))
    }
}

/// Failure to obtain credentials the remote service accepts.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("rendering engine failed: {0}")]
    Browser(#[from] BrowserError),

    #[error("bootstrap request failed: {0}")]
    Http(String),

    #[error("no credentials obtained from {url}")]
    NoCredentials { url: String },
}

/// Failure driving the headless rendering engine.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("could not launch '{command}': {message}")]
    Launch { command: String, message: String },

    #[error("rendering engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("rendering engine exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    #[error("unexpected rendering engine output: {0}")]
    Output(String),
}

/// Per-attempt failure of one transport strategy.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("undecodable payload: {0}")]
    Parse(String),
}

/// Classification of a failed attempt, used to pick the recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Forbidden,
    Network,
    Malformed,
    Status(u16),
}

impl TransportError {
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            retry_after: None,
        }
    }

    pub fn classify(&self) -> FailureKind {
        match self {
            TransportError::Status { status: 429, .. } => FailureKind::RateLimited,
            TransportError::Status { status: 403, .. } => FailureKind::Forbidden,
            TransportError::Status { status, .. } => FailureKind::Status(*status),
            TransportError::Network(_) => FailureKind::Network,
            TransportError::Parse(_) => FailureKind::Malformed,
        }
    }
}

/// Surfaced for one request after retries and escalation ran out.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{} after {attempts} attempts: {last_reason}", outcome(.exhausted))]
pub struct FetchError {
    pub exhausted: bool,
    pub attempts: u32,
    pub last_reason: String,
}

fn outcome(exhausted: &bool) -> &'static str {
    if *exhausted { "gave up" } else { "stopped" }
}

/// Missing or malformed statistics for a single event. Never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("statistics unavailable for event {event_id}: {reason}")]
pub struct StatisticsUnavailable {
    pub event_id: i64,
    pub reason: String,
}
