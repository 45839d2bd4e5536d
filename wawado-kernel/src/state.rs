//! Process-wide watchdog state, shared between the polling loop and the
//! command dispatcher.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Lifecycle of the watchdog loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    #[default]
    Running,
    Paused,
    Stopped,
}

impl LoopState {
    /// Running -> Paused. Returns whether the state changed.
    pub fn pause(&mut self) -> bool {
        self.transition(LoopState::Running, LoopState::Paused)
    }

    /// Paused -> Running. Returns whether the state changed.
    pub fn resume(&mut self) -> bool {
        self.transition(LoopState::Paused, LoopState::Running)
    }

    /// Running | Paused -> Stopped. Returns whether the state changed.
    pub fn stop(&mut self) -> bool {
        if *self == LoopState::Stopped {
            return false;
        }
        *self = LoopState::Stopped;
        true
    }

    fn transition(&mut self, from: LoopState, to: LoopState) -> bool {
        if *self != from {
            return false;
        }
        *self = to;
        true
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Running => "running",
            LoopState::Paused => "paused",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
