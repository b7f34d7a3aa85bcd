// Push delivery intake
// There is no socket transport here. Whatever feeds these events in only
// triggers the same re-fetch path a local send uses, so the backend stays
// the single source of ordering.

use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ChatSession;

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// `from` sent the current user a new message
    MessageReceived { from: String },
    /// Statuses changed in the thread with `contact` (delivered/read receipts)
    StatusChanged { contact: String },
}

impl PushEvent {
    pub fn contact(&self) -> &str {
        match self {
            PushEvent::MessageReceived { from } => from,
            PushEvent::StatusChanged { contact } => contact,
        }
    }
}

impl ChatSession {
    /// React to one push event by re-fetching what it affects
    pub async fn handle_push(&self, event: PushEvent) {
        debug!("Push event: {:?}", event);
        if self.user_id().is_none() {
            return;
        }

        if let PushEvent::MessageReceived { .. } = event {
            // Unread counts live on the backend
            let _ = self.load_conversations().await;
        }

        let active = self.thread.active_contact().await.map(|h| h.contact_id);
        if active.as_deref() == Some(event.contact()) {
            let _ = self.reload_active_thread().await;
        }
    }

    /// Consume push events until the sender side is dropped
    pub fn listen(self: &Arc<Self>, mut events: mpsc::Receiver<PushEvent>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                session.handle_push(event).await;
            }
            info!("Push channel closed");
        })
    }
}
