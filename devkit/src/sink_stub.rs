/*!
Recording alert sink

Stands in for the chat bridge: every alert is recorded, and delivery can be
made to fail to check that callers carry on regardless.
*/

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use wawado_kernel::{AlertSink, Result, WatchdogError};

#[derive(Default)]
struct Inner {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
    delivered: Notify,
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Inner>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Following sends still get recorded but report a transport error
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.inner.sent.lock().len()
    }

    pub fn clear(&self) {
        self.inner.sent.lock().clear();
    }

    /// Waits until at least `count` messages were recorded.
    /// Returns what was recorded so far, or `None` on timeout.
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> Option<Vec<String>> {
        let wait = async {
            loop {
                let notified = self.inner.delivered.notified();
                if self.count() >= count {
                    return self.messages();
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }
}

impl AlertSink for RecordingSink {
    async fn send(&self, message: &str) -> Result<()> {
        self.inner.sent.lock().push(message.to_string());
        self.inner.delivered.notify_waiters();
        tracing::debug!("[mock] alert recorded: {:?}", message);
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(WatchdogError::Transport("mock sink failing".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_even_when_failing() {
        let sink = RecordingSink::new();
        sink.send("first").await.unwrap();
        sink.set_failing(true);
        assert!(sink.send("second").await.is_err());
        assert_eq!(sink.messages(), vec!["first", "second"]);

        sink.clear();
        assert_eq!(sink.count(), 0);
        sink.set_failing(false);
        sink.send("third").await.unwrap();
        assert_eq!(sink.messages(), vec!["third"]);
    }

    #[tokio::test]
    async fn test_wait_for_messages_sees_later_sends() {
        let sink = RecordingSink::new();
        let writer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.send("late").await.unwrap();
        });

        let got = sink.wait_for_messages(1, Duration::from_secs(1)).await;
        assert_eq!(got, Some(vec!["late".to_string()]));
        assert!(sink.wait_for_messages(2, Duration::from_millis(30)).await.is_none());
    }
}
