//! Host-wide system event stream.

use tokio::sync::broadcast;
use tracing::trace;

use hookhost_core::events::{SystemEvent, SystemEventKind};

/// Broadcast channel carrying [`SystemEvent`]s to every subscriber.
///
/// Separate from the named-hook registry. Publishing with no subscriber is
/// not an error; slow subscribers observe `Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct SystemEventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl SystemEventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns the number of subscribers that received it.
    pub fn publish(&self, kind: SystemEventKind) -> usize {
        let event = SystemEvent::new(kind);
        let name = event.name().to_string();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(event = %name, "System event dropped, no subscribers");
                0
            }
        }
    }
}
