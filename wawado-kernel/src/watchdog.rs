//! Host liveness polling loop.
//!
//! RUNNING scans on every tick and switches cadence depending on the result:
//! `poll_interval` while everything answers, `recheck_interval` after an
//! alert. PAUSED idles and re-checks its state every `pause_check`. STOPPED
//! is terminal. A fatal scan error stops the loop for good; any other scan
//! error is retried after `poll_interval`.

use crate::config::LoopTimings;
use crate::error::Result;
use crate::hosts::HostSetMonitor;
use crate::probe::ReachabilityProbe;
use crate::sink::AlertSink;
use crate::state::{new_state, LoopState, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Builds the alert listing every unreachable address, one per line
pub fn offline_alert(unreachable: &[String]) -> String {
    format!("Following devices seem to be offline:\n{}", unreachable.join("\n"))
}

/// Control surface of a running loop, cheap to clone
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Shared<LoopState>,
    wake: Arc<Notify>,
}

impl Default for WatchdogHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchdogHandle {
    pub fn new() -> Self {
        Self {
            state: new_state(LoopState::Running),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    pub fn pause(&self) -> bool {
        self.apply("pause", LoopState::pause)
    }

    pub fn resume(&self) -> bool {
        self.apply("resume", LoopState::resume)
    }

    pub fn stop(&self) -> bool {
        self.apply("stop", LoopState::stop)
    }

    fn apply(&self, command: &str, transition: fn(&mut LoopState) -> bool) -> bool {
        let (changed, now) = {
            let mut state = self.state.lock();
            let changed = transition(&mut *state);
            (changed, *state)
        };
        if changed {
            info!("[watchdog] {} -> {}", command, now);
            self.wake.notify_one();
        } else {
            debug!("[watchdog] {} ignored while {}", command, now);
        }
        changed
    }

    /// Sleeps for `delay` unless a state change wakes the loop earlier
    async fn wait(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.wake.notified() => {}
        }
    }
}

/// Result of one scan cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub unreachable: Vec<String>,
    pub next_in: Duration,
}

pub struct WatchdogLoop<P, S> {
    monitor: HostSetMonitor<P>,
    sink: S,
    timings: LoopTimings,
    handle: WatchdogHandle,
}

impl<P: ReachabilityProbe, S: AlertSink> WatchdogLoop<P, S> {
    pub fn new(monitor: HostSetMonitor<P>, sink: S, timings: LoopTimings) -> Self {
        Self {
            monitor,
            sink,
            timings,
            handle: WatchdogHandle::new(),
        }
    }

    pub fn handle(&self) -> WatchdogHandle {
        self.handle.clone()
    }

    pub fn monitor(&self) -> &HostSetMonitor<P> {
        &self.monitor
    }

    /// Runs one full scan, then alerts. Delivery failures are logged and do
    /// not fail the tick.
    pub async fn tick(&mut self) -> Result<Tick> {
        let unreachable = self.monitor.scan(self.timings.probe_timeout).await?;

        if unreachable.is_empty() {
            debug!("[watchdog] all online");
            return Ok(Tick { unreachable, next_in: self.timings.poll_interval });
        }

        warn!("[watchdog] {} host(s) offline: {}", unreachable.len(), unreachable.join(", "));
        if let Err(e) = self.sink.send(&offline_alert(&unreachable)).await {
            warn!("[watchdog] alert delivery failed: {}", e);
        }
        Ok(Tick { unreachable, next_in: self.timings.recheck_interval })
    }

    /// Drives the loop until a stop command (`Ok`) or a fatal scan error
    /// (`Err`). Other scan errors are retried after `poll_interval`.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "[watchdog] started (poll {:?}, recheck {:?})",
            self.timings.poll_interval, self.timings.recheck_interval
        );
        loop {
            match self.handle.state() {
                LoopState::Stopped => {
                    info!("[watchdog] exiting");
                    return Ok(());
                }
                LoopState::Paused => {
                    self.handle.wait(self.timings.pause_check).await;
                    continue;
                }
                LoopState::Running => {}
            }

            match self.tick().await {
                Ok(tick) => self.handle.wait(tick.next_in).await,
                Err(e) if !e.is_fatal() => {
                    warn!("[watchdog] scan failed, retrying: {}", e);
                    self.handle.wait(self.timings.poll_interval).await;
                }
                Err(e) => {
                    self.handle.stop();
                    error!("[watchdog] scan failed, stopping: {}", e);
                    return Err(e);
                }
            }
        }
    }
}
