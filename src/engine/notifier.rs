use tokio::sync::broadcast;

use crate::models::notification::Notification;

/// Fan-out of user-facing notifications. Sending with nobody listening is fine.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, title: &str, message: impl Into<String>) {
        let _ = self.tx.send(Notification::success(title, message));
    }

    pub fn error(&self, title: &str, message: impl Into<String>) {
        let _ = self.tx.send(Notification::error(title, message));
    }
}
