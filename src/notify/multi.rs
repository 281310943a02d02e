use super::traits::{Notification, Notifier};
use tracing::warn;

/// Fan a notification out to every configured backend.
///
/// Delivery is best-effort: a failing backend is logged and skipped so the
/// remaining backends still get the message.
pub struct NotifierSet {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Returns how many backends accepted the notification.
    pub async fn notify(&self, notification: &Notification) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.send(notification).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    notifier = notifier.name(),
                    kind = %notification.kind,
                    "Notification failed: {e:#}"
                ),
            }
        }
        delivered
    }
}
