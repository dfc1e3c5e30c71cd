use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Events emitted by services after state changes. Consumed by a single
/// logging task today; the channel keeps service code decoupled from
/// whatever consumes them next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(i32),
    UserLoggedIn(i32),
    UserBanToggled { user_id: i32, is_active: bool },

    OrderCompleted { order_id: i32, user_id: i32 },
    BookDownloaded { order_detail_id: i32, book_id: i32 },

    ReviewSubmitted { review_id: i32, book_id: i32 },
    ReviewVisibilityToggled(i32),

    BookCreated(i32),
    BookUpdated(i32),
    BookDeleted(i32),
    BooksBulkUpdated { ids: Vec<i32>, is_active: bool },
    BooksBulkDeleted(Vec<i32>),

    CategoryCreated(i32),
    CategoryUpdated(i32),
    CategoryDeleted(i32),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Fire-and-forget variant for paths where a full channel must not fail
    /// the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Event processing loop. Runs until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCompleted { order_id, user_id } => {
                info!(order_id, user_id, "Order completed");
            }
            Event::BookDownloaded {
                order_detail_id,
                book_id,
            } => {
                info!(order_detail_id, book_id, "Book downloaded");
            }
            Event::UserBanToggled { user_id, is_active } => {
                info!(user_id, is_active, "User active flag toggled");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
