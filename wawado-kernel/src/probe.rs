//! Single-address reachability check.
//!
//! A timeout is a normal `Unreachable` result, never an error. Only a probe
//! that cannot be started at all (missing binary, permissions) is reported as
//! `WatchdogError::Probe`; losing track of a started probe is `WatchdogError::Io`.

use crate::error::{Result, WatchdogError};
use crate::models::Reachability;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Bounded-time liveness check against one address.
///
/// Implementations must not share mutable state between calls: the host
/// monitor runs one probe per address concurrently.
pub trait ReachabilityProbe: Send + Sync {
    fn probe(
        &self,
        address: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Reachability>> + Send;
}

/// Placeholder replaced by the probed address in the argument list
const ADDRESS_SLOT: &str = "{address}";

/// ICMP echo through the platform `ping` binary
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    args: Vec<String>,
}

impl Default for PingProbe {
    fn default() -> Self {
        let count_flag = if cfg!(target_os = "windows") { "-n" } else { "-c" };
        Self {
            program: "ping".to_string(),
            args: vec![count_flag.to_string(), "1".to_string(), ADDRESS_SLOT.to_string()],
        }
    }
}

impl PingProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom probe command; `{address}` in `args` is substituted per call
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    fn command_for(&self, address: &str) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.replace(ADDRESS_SLOT, address)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl ReachabilityProbe for PingProbe {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<Reachability> {
        let mut child = self.command_for(address).spawn().map_err(|source| WatchdogError::Probe {
            address: address.to_string(),
            source,
        })?;

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => Ok(Reachability::Reachable),
            Ok(Ok(status)) => {
                debug!("{} did not answer (exit {:?})", address, status.code());
                Ok(Reachability::Unreachable)
            }
            Ok(Err(e)) => {
                warn!("waiting for the probe of {} failed: {}", address, e);
                Err(WatchdogError::Io(e))
            }
            Err(_) => {
                debug!("{} timed out after {:?}", address, timeout);
                let _ = child.kill().await;
                Ok(Reachability::Unreachable)
            }
        }
    }
}
