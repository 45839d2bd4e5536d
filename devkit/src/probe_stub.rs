/*!
Scripted reachability probe

Answers from a shared table instead of the network. Addresses missing from
the table are reachable. The table can be changed while a watchdog is
running, which is how tests simulate a host going down.
*/

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wawado_kernel::models::Reachability;
use wawado_kernel::probe::ReachabilityProbe;
use wawado_kernel::{Result, WatchdogError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Up,
    Down,
    Broken,
}

#[derive(Clone, Default)]
pub struct ScriptedProbe {
    table: Arc<Mutex<HashMap<String, Answer>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe whose listed addresses are unreachable
    pub fn with_down(addresses: &[&str]) -> Self {
        let probe = Self::new();
        for address in addresses {
            probe.set_down(address);
        }
        probe
    }

    pub fn set_up(&self, address: &str) {
        self.table.lock().insert(address.to_string(), Answer::Up);
    }

    pub fn set_down(&self, address: &str) {
        self.table.lock().insert(address.to_string(), Answer::Down);
    }

    /// Probing `address` fails as if ping could not be started
    pub fn set_broken(&self, address: &str) {
        self.table.lock().insert(address.to_string(), Answer::Broken);
    }

    /// Number of probes answered so far, across clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, address: &str, _timeout: Duration) -> Result<Reachability> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.table.lock().get(address).copied().unwrap_or(Answer::Up);
        match answer {
            Answer::Up => Ok(Reachability::Reachable),
            Answer::Down => Ok(Reachability::Unreachable),
            Answer::Broken => Err(WatchdogError::Probe {
                address: address.to_string(),
                source: std::io::Error::other("scripted probe failure"),
            }),
        }
    }
}
