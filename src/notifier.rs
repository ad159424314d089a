//! Notification dispatch surface (consumed, transport external).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTag {
    Signal,
    Order,
    Trade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub tag: NotificationTag,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn send_notification(&self, message: &str, tag: NotificationTag);
}

/// Drops every notification. Useful as a default when no tags are enabled.
#[derive(Debug, Clone, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send_notification(&self, _message: &str, _tag: NotificationTag) {}
}

/// Pushes notifications onto an `mpsc` channel for cross-task signaling.
/// Useful in tests that want to assert on what was notified.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn send_notification(&self, message: &str, tag: NotificationTag) {
        let _ = self.sender.send(Notification {
            tag,
            message: message.to_string(),
        });
    }
}
