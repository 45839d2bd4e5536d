use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;

/// Outcome of a single reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Unknown,
    Online,
    Offline,
}

impl From<Reachability> for HostStatus {
    fn from(value: Reachability) -> Self {
        match value {
            Reachability::Reachable => HostStatus::Online,
            Reachability::Unreachable => HostStatus::Offline,
        }
    }
}

/// One line of the host list, updated in place on every scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredHost {
    pub address: String,
    pub last_status: HostStatus,
}

impl MonitoredHost {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_status: HostStatus::Unknown,
        }
    }
}

/// What happens when a registered device shows up on the wire
#[derive(Clone, Default)]
pub enum DeviceAction {
    #[default]
    None,
    /// Shell-words template; `{mac}` and `{label}` are substituted
    Command(String),
    Callback(Arc<dyn Fn(&RegisteredDevice) + Send + Sync>),
}

impl fmt::Debug for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::None => f.write_str("None"),
            DeviceAction::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            DeviceAction::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// A hardware address bound to a label, an action and an alert text.
/// `hardware_address` is always stored normalized (lower-case, colon-separated).
#[derive(Debug, Clone)]
pub struct RegisteredDevice {
    pub hardware_address: String,
    pub label: String,
    pub on_detect: DeviceAction,
    pub alert_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDeviceRecord {
    pub hardware_address: String,
    pub first_seen_at: OffsetDateTime,
}
