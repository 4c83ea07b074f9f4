use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting; a full or closed channel is logged and the event dropped.
    pub fn send_or_log(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "dropping domain event");
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Item events
    ItemCreated(Uuid),
    ItemUpdated(Uuid),
    ItemDeleted(Uuid),
    ItemsCleared { count: u64 },
    StockDecremented {
        item_id: Uuid,
        quantity: i32,
        remaining: i32,
    },

    // Neighbor events
    NeighborRegistered(Uuid),
    NeighborDeleted(Uuid),

    // Ledger events
    PurchaseRecorded {
        purchase_id: Uuid,
        neighbor_id: Uuid,
        item_id: Uuid,
        quantity: i32,
        recorded_at: DateTime<Utc>,
    },
    PurchaseDeleted(Uuid),

    // Audit events
    InventoryEdited {
        edit_log_id: Uuid,
        item_id: Uuid,
        previous_quantity: i32,
        new_quantity: i32,
        restock: bool,
    },
    EditLogDeleted(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ItemCreated(_) => "item_created",
            Event::ItemUpdated(_) => "item_updated",
            Event::ItemDeleted(_) => "item_deleted",
            Event::ItemsCleared { .. } => "items_cleared",
            Event::StockDecremented { .. } => "stock_decremented",
            Event::NeighborRegistered(_) => "neighbor_registered",
            Event::NeighborDeleted(_) => "neighbor_deleted",
            Event::PurchaseRecorded { .. } => "purchase_recorded",
            Event::PurchaseDeleted(_) => "purchase_deleted",
            Event::InventoryEdited { .. } => "inventory_edited",
            Event::EditLogDeleted(_) => "edit_log_deleted",
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        crate::metrics::EVENTS_PROCESSED
            .with_label_values(&[event.name()])
            .inc();

        match &event {
            Event::PurchaseRecorded {
                purchase_id,
                neighbor_id,
                item_id,
                quantity,
                ..
            } => {
                info!(%purchase_id, %neighbor_id, %item_id, quantity, "purchase recorded");
            }
            Event::StockDecremented {
                item_id,
                quantity,
                remaining,
            } => {
                info!(%item_id, quantity, remaining, "stock decremented");
                if *remaining == 0 {
                    warn!(%item_id, "item is out of stock");
                }
            }
            Event::InventoryEdited {
                edit_log_id,
                item_id,
                previous_quantity,
                new_quantity,
                restock,
            } => {
                info!(
                    %edit_log_id,
                    %item_id,
                    previous_quantity,
                    new_quantity,
                    restock,
                    "inventory edited"
                );
            }
            other => debug!(event = other.name(), "domain event: {:?}", other),
        }
    }

    info!("Event channel closed; stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_drops_when_full() {
        let (sender, mut rx) = EventSender::channel(1);
        let id = Uuid::new_v4();
        sender.send_or_log(Event::ItemCreated(id));
        sender.send_or_log(Event::ItemDeleted(id));

        match rx.recv().await {
            Some(Event::ItemCreated(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (sender, rx) = EventSender::channel(4);
        drop(rx);
        assert!(sender.send(Event::ItemsCleared { count: 3 }).await.is_err());
        sender.send_or_log(Event::ItemsCleared { count: 3 });
    }
}
