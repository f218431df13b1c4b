//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Probe timed out")]
    ProbeTimeout,

    #[error("Probe failed: {0}")]
    ProbeFailure(String),

    #[error("Restart of {component} failed: {detail}")]
    RestartDispatch { component: String, detail: String },

    #[error("Notification via {channel} failed: {detail}")]
    NotifyDispatch { channel: String, detail: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Clock error: {0}")]
    Clock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn probe(detail: impl Into<String>) -> Self {
        Self::ProbeFailure(detail.into())
    }

    pub fn restart(component: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::RestartDispatch {
            component: component.into(),
            detail: detail.into(),
        }
    }

    pub fn notify(channel: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotifyDispatch {
            channel: channel.into(),
            detail: detail.into(),
        }
    }

    /// Whether the supervisor cannot continue after this error.
    ///
    /// Only losing the ability to tell time is fatal; everything else is
    /// logged and retried on a later tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Clock(_))
    }

    /// Short detail string recorded on a failed probe.
    pub fn probe_detail(&self) -> String {
        match self {
            Self::ProbeTimeout => "timeout".to_string(),
            Self::ProbeFailure(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}
