use crate::error::Result;
use std::future::Future;
use std::sync::Arc;

/// Output collaborator for human-readable alerts.
///
/// Injected into every component that talks to the user; implementations
/// must tolerate concurrent calls from the watchdog loop and the presence
/// watcher.
pub trait AlertSink: Send + Sync {
    fn send(&self, message: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<S: AlertSink> AlertSink for Arc<S> {
    fn send(&self, message: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).send(message)
    }
}
