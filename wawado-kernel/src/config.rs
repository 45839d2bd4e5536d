//! Configuration loading.
//!
//! - `wawado.yaml`: broker, intervals, registered devices (optional file,
//!   defaults apply when absent, invalid content is fatal)
//! - `client.config`: key=value credentials and default message destination
//!   (mandatory, any failure is fatal)

use crate::error::{Result, WatchdogError};
use crate::models::{DeviceAction, RegisteredDevice};
use crate::presence::normalize_mac;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "WAWADO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "wawado.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct WatchdogConfig {
    pub mqtt: MqttConf,
    pub watchdog: LoopConf,
    pub presence: PresenceConf,
    pub chat: ChatConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 1883, keep_alive_secs: 30 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoopConf {
    pub hostfile: PathBuf,
    /// Cadence while every host answers
    pub poll_interval_secs: u64,
    /// Cadence after an alert, longer to avoid flooding the chat
    pub recheck_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub pause_check_millis: u64,
}

impl Default for LoopConf {
    fn default() -> Self {
        Self {
            hostfile: PathBuf::from("hostfile"),
            poll_interval_secs: 60,
            recheck_interval_secs: 3600,
            probe_timeout_secs: 1,
            pause_check_millis: 500,
        }
    }
}

impl LoopConf {
    pub fn timings(&self) -> LoopTimings {
        LoopTimings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            recheck_interval: Duration::from_secs(self.recheck_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            pause_check: Duration::from_millis(self.pause_check_millis),
        }
    }
}

/// Resolved durations driving the watchdog loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTimings {
    pub poll_interval: Duration,
    pub recheck_interval: Duration,
    pub probe_timeout: Duration,
    pub pause_check: Duration,
}

impl Default for LoopTimings {
    fn default() -> Self {
        LoopConf::default().timings()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PresenceConf {
    pub cooldown_millis: u64,
    pub devices: Vec<DeviceConf>,
}

impl Default for PresenceConf {
    fn default() -> Self {
        Self { cooldown_millis: 1000, devices: Vec::new() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeviceConf {
    pub mac: String,
    pub label: String,
    pub message: String,
    pub command: Option<String>, // ex: "/usr/local/bin/order.sh {label} {mac}"
}

impl DeviceConf {
    pub fn to_device(&self, source: &Path) -> Result<RegisteredDevice> {
        let hardware_address = normalize_mac(&self.mac).ok_or_else(|| {
            WatchdogError::config(source, format!("device '{}' has invalid mac '{}'", self.label, self.mac))
        })?;
        Ok(RegisteredDevice {
            hardware_address,
            label: self.label.clone(),
            on_detect: self.command.clone().map(DeviceAction::Command).unwrap_or_default(),
            alert_message: self.message.clone(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConf {
    pub ack_timeout_secs: u64,
}

impl Default for ChatConf {
    fn default() -> Self {
        Self { ack_timeout_secs: 10 }
    }
}

/// Credentials and routing from the key=value client file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub phone: String,
    pub password: String,
    pub receiver: String,
    pub init_message: Option<String>,
}

pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

pub async fn load_config(path: &Path) -> Result<WatchdogConfig> {
    if !path.exists() {
        warn!("No {} found, using default configuration", path.display());
        return Ok(WatchdogConfig::default());
    }
    let txt = fs::read_to_string(path)
        .await
        .map_err(|e| WatchdogError::config(path, e.to_string()))?;
    if txt.trim().is_empty() {
        return Ok(WatchdogConfig::default());
    }
    let cfg: WatchdogConfig =
        serde_yaml::from_str(&txt).map_err(|e| WatchdogError::config(path, e.to_string()))?;
    info!(
        "Loaded {} ({} registered devices)",
        path.display(),
        cfg.presence.devices.len()
    );
    Ok(cfg)
}

pub async fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let txt = fs::read_to_string(path)
        .await
        .map_err(|e| WatchdogError::config(path, e.to_string()))?;
    parse_client_config(&txt, path)
}

/// Parses `key=value` lines, splitting on the first `=`. Blank lines and
/// lines starting with `#` or `;` are skipped. Values are kept verbatim
/// apart from surrounding whitespace.
pub fn parse_client_config(txt: &str, source: &Path) -> Result<ClientConfig> {
    let mut values = HashMap::new();
    for (lineno, line) in txt.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        let (key, value) = trimmed.split_once('=').ok_or_else(|| {
            WatchdogError::config(source, format!("line {} is not key=value", lineno + 1))
        })?;
        values.insert(key.trim().to_string(), value.trim().to_string());
    }

    let mut take = |key: &str| {
        values
            .remove(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| WatchdogError::config(source, format!("missing key '{key}'")))
    };
    Ok(ClientConfig {
        phone: take("phone")?,
        password: take("password")?,
        receiver: take("receiver")?,
        init_message: take("initmessage").ok(),
    })
}
