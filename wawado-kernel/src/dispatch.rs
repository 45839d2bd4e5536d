//! Text commands received over the chat transport.
//!
//! Matching is exact and case-sensitive. Unknown text is ignored without any
//! reply to the sender.

use crate::watchdog::WatchdogHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Resume,
    Pause,
    Stop,
}

const COMMANDS: &[(&str, Command)] = &[
    ("start", Command::Resume),
    ("pause", Command::Pause),
    ("stop", Command::Stop),
];

impl Command {
    pub fn parse(text: &str) -> Option<Command> {
        COMMANDS
            .iter()
            .find(|(keyword, _)| *keyword == text)
            .map(|(_, command)| *command)
    }
}

pub struct CommandDispatcher {
    watchdog: WatchdogHandle,
}

impl CommandDispatcher {
    pub fn new(watchdog: WatchdogHandle) -> Self {
        Self { watchdog }
    }

    /// Keywords understood by `dispatch`
    pub fn commands() -> impl Iterator<Item = &'static str> {
        COMMANDS.iter().map(|(keyword, _)| *keyword)
    }

    /// Returns whether `text` is a known command. A known command is handled
    /// even when the watchdog ignores it (e.g. anything after `stop`).
    pub fn dispatch(&self, text: &str) -> bool {
        let Some(command) = Command::parse(text) else {
            debug!("[dispatch] ignoring {:?}", text);
            return false;
        };
        let changed = match command {
            Command::Resume => self.watchdog.resume(),
            Command::Pause => self.watchdog.pause(),
            Command::Stop => self.watchdog.stop(),
        };
        info!("[dispatch] {:?} (state changed: {})", command, changed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LoopState;

    fn dispatcher() -> (CommandDispatcher, WatchdogHandle) {
        let handle = WatchdogHandle::new();
        (CommandDispatcher::new(handle.clone()), handle)
    }

    #[test]
    fn test_parse_is_exact_and_case_sensitive() {
        assert_eq!(Command::parse("start"), Some(Command::Resume));
        assert_eq!(Command::parse("Start"), None);
        assert_eq!(Command::parse(" stop"), None);
        assert_eq!(Command::parse("hello"), None);
    }

    #[test]
    fn test_unknown_text_is_not_handled() {
        let (dispatcher, handle) = dispatcher();
        assert!(!dispatcher.dispatch("PAUSE"));
        assert_eq!(handle.state(), LoopState::Running);
    }

    #[test]
    fn test_pause_then_start_resumes() {
        let (dispatcher, handle) = dispatcher();
        assert!(dispatcher.dispatch("pause"));
        assert_eq!(handle.state(), LoopState::Paused);
        assert!(dispatcher.dispatch("pause"));
        assert_eq!(handle.state(), LoopState::Paused);
        assert!(dispatcher.dispatch("start"));
        assert_eq!(handle.state(), LoopState::Running);
    }

    #[test]
    fn test_start_after_stop_is_handled_but_inert() {
        let (dispatcher, handle) = dispatcher();
        assert!(dispatcher.dispatch("stop"));
        assert_eq!(handle.state(), LoopState::Stopped);
        assert!(dispatcher.dispatch("start"));
        assert!(dispatcher.dispatch("pause"));
        assert_eq!(handle.state(), LoopState::Stopped);
    }

    #[test]
    fn test_command_keywords() {
        let keywords: Vec<_> = CommandDispatcher::commands().collect();
        assert_eq!(keywords, vec!["start", "pause", "stop"]);
    }
}
