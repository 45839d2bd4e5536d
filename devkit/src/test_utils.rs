/*!
Test harness for the WaWaDo kernel

Owns a temporary directory for host lists and client files, plus the shared
probe and sink every component built through it reports to.
*/

use crate::payloads::PayloadBuilder;
use crate::probe_stub::ScriptedProbe;
use crate::sink_stub::RecordingSink;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wawado_kernel::ack::AckTracker;
use wawado_kernel::config::LoopTimings;
use wawado_kernel::hosts::HostSetMonitor;
use wawado_kernel::presence::PresenceWatcher;
use wawado_kernel::transport::{route_publish, BusEvent};
use wawado_kernel::watchdog::WatchdogLoop;

/// Short timings so a running loop cycles within a test's lifetime
pub fn fast_timings() -> LoopTimings {
    LoopTimings {
        poll_interval: Duration::from_millis(50),
        recheck_interval: Duration::from_millis(200),
        probe_timeout: Duration::from_millis(20),
        pause_check: Duration::from_millis(10),
    }
}

pub struct TestHarness {
    pub probe: ScriptedProbe,
    pub sink: RecordingSink,
    pub acks: AckTracker,
    dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
        Ok(Self {
            probe: ScriptedProbe::new(),
            sink: RecordingSink::new(),
            acks: AckTracker::new(),
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `content` as `name` in the harness directory
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// One address per line, as the host file expects
    pub fn write_hostfile(&self, addresses: &[&str]) -> Result<PathBuf> {
        let mut content = addresses.join("\n");
        content.push('\n');
        self.write_file("hostfile", &content)
    }

    pub fn write_client_config(&self, phone: &str, password: &str, receiver: &str) -> Result<PathBuf> {
        let content = format!("phone={phone}\npassword={password}\nreceiver={receiver}\n");
        self.write_file("client.config", &content)
    }

    /// Watchdog over `addresses`, loaded through a real host file
    pub async fn watchdog(&self, addresses: &[&str]) -> Result<WatchdogLoop<ScriptedProbe, RecordingSink>> {
        let hostfile = self.write_hostfile(addresses)?;
        let monitor = HostSetMonitor::from_file(&hostfile, self.probe.clone()).await?;
        Ok(WatchdogLoop::new(monitor, self.sink.clone(), fast_timings()))
    }

    pub fn presence(&self, cooldown: Duration) -> PresenceWatcher<RecordingSink> {
        PresenceWatcher::new(self.sink.clone(), cooldown)
    }

    /// Feeds a payload through the same routing the MQTT event loop uses
    pub fn route(&self, payload: &PayloadBuilder) -> Result<Option<BusEvent>> {
        Ok(route_publish(payload.topic(), &payload.to_bytes()?, &self.acks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wawado_kernel::transport::InboundMessage;

    #[tokio::test]
    async fn test_watchdog_reads_hostfile() {
        let harness = TestHarness::new().unwrap();
        let watchdog = harness.watchdog(&["10.0.0.1", "10.0.0.2"]).await.unwrap();
        let hosts: Vec<_> = watchdog.monitor().hosts().iter().map(|h| h.address.clone()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(watchdog.monitor().source(), harness.path("hostfile").as_path());
    }

    #[test]
    fn test_route_inbound_payload() {
        let harness = TestHarness::new().unwrap();
        let event = harness.route(&PayloadBuilder::inbound("491707654321", "pause")).unwrap();
        assert_eq!(
            event,
            Some(BusEvent::Inbound(InboundMessage {
                from: "491707654321".into(),
                body: "pause".into(),
            }))
        );
    }
}
