// Conversation directory
// Keeps the contact list for the current user, refreshed from the backend on every load.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

use super::api::MessagesApi;
use super::token::RequestTokens;
use super::{LoadOutcome, MessagingError};
use crate::models::Contact;

/// What the contact list currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryView {
    pub contacts: Vec<Contact>,
    pub loading: bool,
    /// Set after a failed load; the previous list stays visible underneath it
    pub error: Option<String>,
}

impl DirectoryView {
    pub fn find(&self, contact_id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.public_id == contact_id)
    }
}

pub struct ConversationDirectory {
    api: Arc<dyn MessagesApi>,
    tokens: RequestTokens,
    view: TokioMutex<DirectoryView>,
}

impl ConversationDirectory {
    pub fn new(api: Arc<dyn MessagesApi>) -> Self {
        ConversationDirectory {
            api,
            tokens: RequestTokens::new(),
            view: TokioMutex::new(DirectoryView::default()),
        }
    }

    /// Load the conversations of `current_user_id`.
    ///
    /// Only the most recently issued load may touch the view. An older call that
    /// completes afterwards reports `LoadOutcome::Superseded`, whether it succeeded or not.
    pub async fn load(&self, current_user_id: &str) -> Result<LoadOutcome<Vec<Contact>>, MessagingError> {
        let token = self.tokens.issue();
        self.view.lock().await.loading = true;
        debug!("Loading conversations for {} (request {})", current_user_id, token);

        let result = self.api.my_conversations(current_user_id).await;

        let mut view = self.view.lock().await;
        if !self.tokens.is_current(token) {
            debug!("Dropping superseded conversations response (request {})", token);
            return Ok(LoadOutcome::Superseded);
        }
        view.loading = false;

        match result {
            Ok(contacts) => {
                info!("Loaded {} conversations", contacts.len());
                view.contacts = contacts.clone();
                view.error = None;
                Ok(LoadOutcome::Applied(contacts))
            }
            Err(e) => {
                warn!("Failed to load conversations: {}", e);
                view.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn view(&self) -> DirectoryView {
        self.view.lock().await.clone()
    }

    pub async fn contact(&self, contact_id: &str) -> Option<Contact> {
        self.view.lock().await.find(contact_id).cloned()
    }
}
