// Thread loader
// Holds the message history for the selected contact. Every selection is a full reload.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

use super::api::MessagesApi;
use super::token::RequestTokens;
use super::{LoadOutcome, MessagingError};
use crate::models::{is_chronological, Message, MessageStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadState {
    /// No contact selected
    Idle,
    Loading,
    Loaded,
    /// Loaded but there is nothing to show yet
    Empty,
    /// The last load failed; selecting the contact again retries
    Failed(String),
}

/// The selected contact as shown in the thread header
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadHeader {
    pub contact_id: String,
    pub contact_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadView {
    pub header: Option<ThreadHeader>,
    pub messages: Vec<Message>,
    pub state: ThreadState,
}

impl Default for ThreadView {
    fn default() -> Self {
        ThreadView {
            header: None,
            messages: Vec::new(),
            state: ThreadState::Idle,
        }
    }
}

impl ThreadView {
    pub fn contact_id(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.contact_id.as_str())
    }

    pub fn is_empty_thread(&self) -> bool {
        self.state == ThreadState::Empty
    }
}

pub struct ThreadLoader {
    api: Arc<dyn MessagesApi>,
    tokens: RequestTokens,
    view: TokioMutex<ThreadView>,
}

impl ThreadLoader {
    pub fn new(api: Arc<dyn MessagesApi>) -> Self {
        ThreadLoader {
            api,
            tokens: RequestTokens::new(),
            view: TokioMutex::new(ThreadView::default()),
        }
    }

    /// Select `header.contact_id` and load its history with `current_user_id`.
    ///
    /// The header switches immediately; the messages only replace the view if no
    /// newer selection has been issued by the time the backend answers.
    pub async fn load(
        &self,
        current_user_id: &str,
        header: ThreadHeader,
    ) -> Result<LoadOutcome<Vec<Message>>, MessagingError> {
        let contact_id = header.contact_id.clone();
        let token = {
            let mut view = self.view.lock().await;
            if view.contact_id() != Some(contact_id.as_str()) {
                view.messages.clear();
            }
            view.header = Some(header);
            view.state = ThreadState::Loading;
            self.tokens.issue()
        };
        self.fetch(token, current_user_id, &contact_id).await
    }

    /// Re-fetch whatever contact is selected right now, or `None` when nothing is.
    ///
    /// The header is read and the request token issued under the same lock, so a
    /// selection made meanwhile always outranks this reload.
    pub async fn reload(
        &self,
        current_user_id: &str,
    ) -> Option<(ThreadHeader, Result<LoadOutcome<Vec<Message>>, MessagingError>)> {
        let (header, token) = {
            let mut view = self.view.lock().await;
            let header = view.header.clone()?;
            // Old messages stay up until the new ones land
            view.state = ThreadState::Loading;
            (header, self.tokens.issue())
        };
        let result = self.fetch(token, current_user_id, &header.contact_id).await;
        Some((header, result))
    }

    async fn fetch(
        &self,
        token: u64,
        current_user_id: &str,
        contact_id: &str,
    ) -> Result<LoadOutcome<Vec<Message>>, MessagingError> {
        debug!("Loading thread with {} (request {})", contact_id, token);

        let result = self.api.messages_with(current_user_id, contact_id).await;

        let mut view = self.view.lock().await;
        if !self.tokens.is_current(token) {
            debug!("Dropping superseded thread response for {} (request {})", contact_id, token);
            return Ok(LoadOutcome::Superseded);
        }

        match result {
            Ok(messages) => {
                if !is_chronological(&messages) {
                    warn!("Thread with {} is not in createdAt order; keeping server order", contact_id);
                }
                info!("Loaded {} messages with {}", messages.len(), contact_id);
                view.state = if messages.is_empty() {
                    ThreadState::Empty
                } else {
                    ThreadState::Loaded
                };
                view.messages = messages.clone();
                Ok(LoadOutcome::Applied(messages))
            }
            Err(MessagingError::NotFound(detail)) => {
                warn!("Thread with {} not found: {}", contact_id, detail);
                view.messages.clear();
                view.state = ThreadState::Empty;
                Err(MessagingError::NotFound(detail))
            }
            Err(e) => {
                warn!("Failed to load thread with {}: {}", contact_id, e);
                view.messages.clear();
                view.state = ThreadState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Optimistically show `message_id` as read. Returns false if it was not in view or already read.
    pub async fn flip_read(&self, message_id: &str) -> bool {
        let mut view = self.view.lock().await;
        match view.messages.iter_mut().find(|m| m.public_id == message_id) {
            Some(message) => message.status.advance_to(MessageStatus::Read),
            None => false,
        }
    }

    pub async fn view(&self) -> ThreadView {
        self.view.lock().await.clone()
    }

    pub async fn active_contact(&self) -> Option<ThreadHeader> {
        self.view.lock().await.header.clone()
    }
}
