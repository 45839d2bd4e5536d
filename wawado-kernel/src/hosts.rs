//! Fixed set of monitored addresses, probed together on every watchdog tick.

use crate::error::{Result, WatchdogError};
use crate::models::{HostStatus, MonitoredHost, Reachability};
use crate::probe::ReachabilityProbe;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Extracts addresses from a host list: one per line, blank lines and lines
/// starting with `#` or `;` ignored.
pub fn parse_host_list(txt: &str) -> Vec<String> {
    txt.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .map(str::to_string)
        .collect()
}

pub struct HostSetMonitor<P> {
    source: PathBuf,
    hosts: Vec<MonitoredHost>,
    probe: P,
}

impl<P: ReachabilityProbe> HostSetMonitor<P> {
    /// Loads the host list once. An unreadable or empty list is a
    /// configuration error and must not be retried.
    pub async fn from_file(path: impl AsRef<Path>, probe: P) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .await
            .map_err(|e| WatchdogError::config(path, format!("cannot read host list: {e}")))?;
        let monitor = Self::from_addresses(path, parse_host_list(&txt), probe)?;
        info!("Monitoring {} hosts from {}", monitor.hosts.len(), path.display());
        Ok(monitor)
    }

    pub fn from_addresses(
        source: impl Into<PathBuf>,
        addresses: Vec<String>,
        probe: P,
    ) -> Result<Self> {
        let source = source.into();
        if addresses.is_empty() {
            return Err(WatchdogError::EmptyHostList { path: source });
        }
        Ok(Self {
            source,
            hosts: addresses.into_iter().map(MonitoredHost::new).collect(),
            probe,
        })
    }

    /// Probes every host concurrently and returns the unreachable addresses
    /// in list order. Statuses are only updated once every probe finished.
    pub async fn scan(&mut self, timeout: Duration) -> Result<Vec<String>> {
        let probe = &self.probe;
        let results = join_all(
            self.hosts
                .iter()
                .map(|host| probe.probe(&host.address, timeout)),
        )
        .await;
        let results = results.into_iter().collect::<Result<Vec<Reachability>>>()?;

        let mut unreachable = Vec::new();
        for (host, reachability) in self.hosts.iter_mut().zip(results) {
            let status = HostStatus::from(reachability);
            if host.last_status != status {
                debug!("{}: {:?} -> {:?}", host.address, host.last_status, status);
            }
            host.last_status = status;
            if !reachability.is_reachable() {
                unreachable.push(host.address.clone());
            }
        }
        Ok(unreachable)
    }

    pub fn hosts(&self) -> &[MonitoredHost] {
        &self.hosts
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers from a fixed table; addresses missing from it are unreachable
    struct TableProbe(HashMap<&'static str, Reachability>);

    impl ReachabilityProbe for TableProbe {
        async fn probe(&self, address: &str, _timeout: Duration) -> Result<Reachability> {
            Ok(self.0.get(address).copied().unwrap_or(Reachability::Unreachable))
        }
    }

    struct BrokenProbe;

    impl ReachabilityProbe for BrokenProbe {
        async fn probe(&self, address: &str, _timeout: Duration) -> Result<Reachability> {
            Err(WatchdogError::Probe {
                address: address.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "ping missing"),
            })
        }
    }

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_host_list_ignores_comments_and_blanks() {
        let txt = "# router\n10.0.0.1\n\n; nas\n  10.0.0.2  \n\t\n";
        assert_eq!(parse_host_list(txt), addrs(&["10.0.0.1", "10.0.0.2"]));
    }

    #[test]
    fn test_empty_list_fails_fast() {
        let err = HostSetMonitor::from_addresses("hostfile", vec![], TableProbe(HashMap::new()))
            .err()
            .unwrap();
        assert!(matches!(err, WatchdogError::EmptyHostList { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_scan_reports_only_unreachable_in_order() {
        let probe = TableProbe(HashMap::from([
            ("10.0.0.1", Reachability::Reachable),
            ("10.0.0.2", Reachability::Unreachable),
        ]));
        let mut monitor =
            HostSetMonitor::from_addresses("hostfile", addrs(&["10.0.0.1", "10.0.0.2"]), probe).unwrap();

        let down = monitor.scan(Duration::from_secs(1)).await.unwrap();
        assert_eq!(down, addrs(&["10.0.0.2"]));
        assert_eq!(monitor.hosts()[0].last_status, HostStatus::Online);
        assert_eq!(monitor.hosts()[1].last_status, HostStatus::Offline);

        // unchanged reachability gives the same answer
        assert_eq!(monitor.scan(Duration::from_secs(1)).await.unwrap(), down);
    }

    #[tokio::test]
    async fn test_all_unreachable_returns_full_list_in_order() {
        let list = addrs(&["10.0.0.9", "10.0.0.3", "10.0.0.5"]);
        let mut monitor =
            HostSetMonitor::from_addresses("hostfile", list.clone(), TableProbe(HashMap::new())).unwrap();
        assert_eq!(monitor.scan(Duration::from_secs(1)).await.unwrap(), list);
    }

    #[tokio::test]
    async fn test_probe_failure_leaves_statuses_untouched() {
        let mut monitor =
            HostSetMonitor::from_addresses("hostfile", addrs(&["10.0.0.1"]), BrokenProbe).unwrap();
        assert!(monitor.scan(Duration::from_secs(1)).await.is_err());
        assert_eq!(monitor.hosts()[0].last_status, HostStatus::Unknown);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_config_error() {
        let err = HostSetMonitor::from_file("/nonexistent/hostfile", BrokenProbe)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WatchdogError::Config { .. }));
    }
}
