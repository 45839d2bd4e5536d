//! Error taxonomy for the watchdog kernel.
//!
//! Configuration failures are fatal and never retried. Probe timeouts are not
//! errors at all (they surface as `Reachability::Unreachable`). Transport
//! failures and I/O hiccups while a probe runs are reported to the caller,
//! which logs them and keeps monitoring.

use std::path::PathBuf;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, WatchdogError>;

/// Errors raised by the kernel components
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("Invalid configuration in {path}: {details}")]
    Config { path: PathBuf, details: String },
    #[error("Host list is empty: {path}")]
    EmptyHostList { path: PathBuf },
    #[error("Probe could not be started for {address}: {source}")]
    Probe {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid hardware address: {0}")]
    InvalidAddress(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("No acknowledgment received for message {id}")]
    AckTimeout { id: Uuid },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WatchdogError {
    pub fn config(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Whether the process should terminate instead of logging and carrying on
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::EmptyHostList { .. } | Self::Probe { .. }
        )
    }
}

impl From<rumqttc::ClientError> for WatchdogError {
    fn from(value: rumqttc::ClientError) -> Self {
        Self::Transport(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(WatchdogError::config("client.config", "missing receiver").is_fatal());
        assert!(WatchdogError::EmptyHostList { path: "hostfile".into() }.is_fatal());
        assert!(!WatchdogError::Transport("broker gone".into()).is_fatal());
        assert!(!WatchdogError::AckTimeout { id: Uuid::new_v4() }.is_fatal());
        assert!(!WatchdogError::Io(std::io::Error::other("child lost")).is_fatal());
    }

    #[test]
    fn test_config_error_message() {
        let err = WatchdogError::config("client.config", "missing key 'phone'");
        assert_eq!(
            err.to_string(),
            "Invalid configuration in client.config: missing key 'phone'"
        );
    }
}
