use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartUpdated {
        session_id: String,
    },
    CheckoutStarted {
        session_id: String,
        gateway_order_id: String,
    },
    OrderPlaced(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    /// A payment callback failed signature verification. Security relevant.
    PaymentRejected {
        gateway_order_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing if the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Consumes events from the channel and logs them. Downstream integrations
/// (notifications, analytics) hang off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PaymentRejected { gateway_order_id } => {
                warn!(%gateway_order_id, "rejected payment callback");
            }
            _ => info!(event = ?event, "event processed"),
        }
    }
}
