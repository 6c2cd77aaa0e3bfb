use crate::traits::StatusSurface;
use crate::types::StatusDisplay;

/// Status bus using tokio broadcast channel.
/// All subscribers receive every status transition.
pub struct StatusBus {
    tx: tokio::sync::broadcast::Sender<StatusDisplay>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, display: StatusDisplay) {
        // Ignore error if no receivers
        let _ = self.tx.send(display);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StatusDisplay> {
        self.tx.subscribe()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl StatusSurface for StatusBus {
    fn render(&self, shown: &StatusDisplay) {
        self.publish(*shown);
    }
}
