use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Result code carried by management notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

/// Notifications published to the management bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "outcome", rename_all = "snake_case")]
pub enum MgmtEvent {
    /// Asynchronous end of a connect request
    ConnectResult(Outcome),
    /// Station-mode disconnect confirmed (or not)
    DisconnectComplete(Outcome),
    /// Access point torn down (or not)
    ApDisableResult(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub iface: String,
    #[serde(flatten)]
    pub event: MgmtEvent,
    pub at: DateTime<Utc>,
}

/// One-way sink for management notifications.
///
/// Cloned into every task that publishes; a dropped receiver just means
/// nobody is listening.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Notification>,
}

impl EventBus {
    /// Create a bus and the receiving end for the management layer
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, iface: &str, event: MgmtEvent) {
        let notification = Notification {
            iface: iface.to_string(),
            event,
            at: Utc::now(),
        };
        if self.tx.send(notification).is_err() {
            debug!("No listener for {:?} on {}", event, iface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_receiver() {
        let (bus, mut rx) = EventBus::channel();
        bus.publish("wlan0", MgmtEvent::ConnectResult(Outcome::Timeout));

        let n = rx.try_recv().unwrap();
        assert_eq!(n.iface, "wlan0");
        assert_eq!(n.event, MgmtEvent::ConnectResult(Outcome::Timeout));
    }

    #[test]
    fn test_publish_without_listener_is_harmless() {
        let (bus, rx) = EventBus::channel();
        drop(rx);
        bus.publish("wlan0", MgmtEvent::DisconnectComplete(Outcome::Success));
    }

    #[test]
    fn test_json_shape() {
        let (bus, mut rx) = EventBus::channel();
        bus.publish("wlan0", MgmtEvent::ApDisableResult(Outcome::Failure));
        let json = serde_json::to_value(rx.try_recv().unwrap()).unwrap();

        assert_eq!(json["iface"], "wlan0");
        assert_eq!(json["event"], "ap_disable_result");
        assert_eq!(json["outcome"], "failure");
    }
}
