// Messaging core for tenant-chat
// Conversation directory, thread loader and message dispatcher, wired together
// by `ChatSession` for one signed-in user.

use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;

pub mod api;
pub mod directory;
pub mod dispatcher;
pub mod envelope;
pub mod push;
pub mod thread;
pub mod token;

pub use api::{ApiConfig, HttpApi, MessagesApi};
pub use directory::{ConversationDirectory, DirectoryView};
pub use dispatcher::{MessageDispatcher, SendOutcome};
pub use push::PushEvent;
pub use thread::{ThreadHeader, ThreadLoader, ThreadState, ThreadView};

use crate::models::{Contact, Message};

/// Errors surfaced by the messaging core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    /// Bad input caught before any request was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend could not be reached or the transfer broke off
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-2xx answer or a payload that does not match the expected shape
    #[error("Server error: {0}")]
    Server(String),
}

impl MessagingError {
    /// Whether repeating the same user action may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MessagingError::Validation(_))
    }
}

/// Result of a load that may have been overtaken by a newer one
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    Applied(T),
    Superseded,
}

impl<T> LoadOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            LoadOutcome::Applied(value) => Some(value),
            LoadOutcome::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, LoadOutcome::Superseded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Non-blocking user notification (the toast)
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Everything a front-end needs to draw the chat
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSnapshot {
    pub directory: DirectoryView,
    pub thread: ThreadView,
    pub draft: String,
    /// True while a send is outstanding; the send control should be disabled
    pub sending: bool,
}

/// Messaging state for one signed-in user.
///
/// The user id is fixed at construction. Without one the session is inert:
/// nothing is loaded and sends are refused.
pub struct ChatSession {
    user_id: Option<String>,
    directory: Arc<ConversationDirectory>,
    thread: Arc<ThreadLoader>,
    dispatcher: Arc<MessageDispatcher>,
    draft: TokioMutex<String>,
    notice_tx: mpsc::Sender<Notice>,
    read_marks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn MessagesApi>, user_id: Option<String>) -> (Self, mpsc::Receiver<Notice>) {
        let (notice_tx, notice_rx) = mpsc::channel(100);
        let user_id = user_id.filter(|id| !id.trim().is_empty());
        if user_id.is_none() {
            info!("No session identity, messaging is inert");
        }

        (Self {
            user_id,
            directory: Arc::new(ConversationDirectory::new(api.clone())),
            thread: Arc::new(ThreadLoader::new(api.clone())),
            dispatcher: Arc::new(MessageDispatcher::new(api)),
            draft: TokioMutex::new(String::new()),
            notice_tx,
            read_marks: Mutex::new(Vec::new()),
        }, notice_rx)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        let notice = Notice { level, text: text.into() };
        // Never block on the UI side
        if let Err(e) = self.notice_tx.try_send(notice) {
            debug!("Dropped notice: {}", e);
        }
    }

    fn require_user(&self) -> Result<&str, MessagingError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| MessagingError::Validation("no active session".to_string()))
    }

    /// Load the directory, then select `initial_contact` if the caller came in with one
    pub async fn open(&self, initial_contact: Option<&str>) {
        let _ = self.load_conversations().await;
        if let Some(contact_id) = initial_contact {
            let _ = self.select_contact(contact_id).await;
        }
    }

    pub async fn load_conversations(&self) -> Result<LoadOutcome<Vec<Contact>>, MessagingError> {
        let user_id = match self.user_id.as_deref() {
            Some(user_id) => user_id,
            None => return Ok(LoadOutcome::Applied(Vec::new())),
        };

        let result = self.directory.load(user_id).await;
        if let Err(e) = &result {
            self.notify(NoticeLevel::Error, format!("Could not load conversations: {}", e));
        }
        result
    }

    /// Switch the thread to `contact_id` and load it from scratch
    pub async fn select_contact(&self, contact_id: &str) -> Result<LoadOutcome<Vec<Message>>, MessagingError> {
        if contact_id.trim().is_empty() {
            let e = MessagingError::Validation("no contact selected".to_string());
            self.notify(NoticeLevel::Error, e.to_string());
            return Err(e);
        }

        let contact_name = self
            .directory
            .contact(contact_id)
            .await
            .map(|c| c.name)
            .unwrap_or_else(|| contact_id.to_string());
        self.load_thread(ThreadHeader {
            contact_id: contact_id.to_string(),
            contact_name,
        })
        .await
    }

    async fn load_thread(&self, header: ThreadHeader) -> Result<LoadOutcome<Vec<Message>>, MessagingError> {
        let user_id = match self.require_user() {
            Ok(user_id) => user_id,
            Err(e) => {
                self.notify(NoticeLevel::Error, e.to_string());
                return Err(e);
            }
        };

        let contact_name = header.contact_name.clone();
        let result = self.thread.load(user_id, header).await;
        self.finish_thread_load(user_id, &contact_name, result)
    }

    /// Start read-marking after an applied load, raise a notice after a failed one
    fn finish_thread_load(
        &self,
        user_id: &str,
        contact_name: &str,
        result: Result<LoadOutcome<Vec<Message>>, MessagingError>,
    ) -> Result<LoadOutcome<Vec<Message>>, MessagingError> {
        match result {
            Ok(LoadOutcome::Applied(messages)) => {
                let unread = messages
                    .iter()
                    .filter(|m| m.awaits_read_by(user_id))
                    .map(|m| m.public_id.clone())
                    .collect();
                self.spawn_read_marking(unread);
                Ok(LoadOutcome::Applied(messages))
            }
            Ok(LoadOutcome::Superseded) => Ok(LoadOutcome::Superseded),
            Err(e) => {
                self.notify(
                    NoticeLevel::Error,
                    format!("Could not load messages with {}: {}", contact_name, e),
                );
                Err(e)
            }
        }
    }

    /// Re-fetch the directory and whatever thread is open
    pub async fn refresh(&self) {
        let _ = self.load_conversations().await;
        let _ = self.reload_active_thread().await;
    }

    pub(crate) async fn reload_active_thread(&self) -> Option<Result<LoadOutcome<Vec<Message>>, MessagingError>> {
        let user_id = self.user_id.as_deref()?;
        let (header, result) = self.thread.reload(user_id).await?;
        Some(self.finish_thread_load(user_id, &header.contact_name, result))
    }

    pub async fn set_draft(&self, text: &str) {
        *self.draft.lock().await = text.to_string();
    }

    pub async fn draft(&self) -> String {
        self.draft.lock().await.clone()
    }

    /// Send the draft to the selected contact.
    ///
    /// The draft is cleared and the thread re-fetched only once the backend confirms.
    /// On any failure the draft is left exactly as typed.
    pub async fn submit(&self) -> Result<SendOutcome, MessagingError> {
        let text = self.draft().await;
        let header = self.thread.active_contact().await;
        let to_id = header.as_ref().map(|h| h.contact_id.as_str()).unwrap_or("");
        let from_id = self.user_id.as_deref().unwrap_or("");

        match self.dispatcher.send_message(from_id, to_id, &text).await {
            Ok(SendOutcome::Sent(message)) => {
                {
                    // Text typed while the send was in flight is kept
                    let mut draft = self.draft.lock().await;
                    if *draft == text {
                        draft.clear();
                    }
                }
                // Backend order and status win over the returned copy
                let _ = self.reload_active_thread().await;
                Ok(SendOutcome::Sent(message))
            }
            Ok(SendOutcome::Ignored) => Ok(SendOutcome::Ignored),
            Err(e) => {
                self.notify(NoticeLevel::Error, format!("Message not sent: {}", e));
                Err(e)
            }
        }
    }

    /// One-off message to any contact, leaving the draft and selection alone
    pub async fn send_to(&self, contact_id: &str, text: &str) -> Result<SendOutcome, MessagingError> {
        let from_id = self.user_id.as_deref().unwrap_or("");
        match self.dispatcher.send_message(from_id, contact_id, text).await {
            Ok(SendOutcome::Sent(message)) => {
                self.notify(NoticeLevel::Success, "Message sent successfully.");
                let _ = self.load_conversations().await;
                if self.thread.active_contact().await.map(|h| h.contact_id).as_deref() == Some(contact_id) {
                    let _ = self.reload_active_thread().await;
                }
                Ok(SendOutcome::Sent(message))
            }
            Ok(SendOutcome::Ignored) => Ok(SendOutcome::Ignored),
            Err(e) => {
                self.notify(NoticeLevel::Error, format!("Message not sent: {}", e));
                Err(e)
            }
        }
    }

    /// Show `message_id` as read and tell the backend. Failures are only logged.
    pub async fn mark_read(&self, message_id: &str) {
        mark_one_read(&self.thread, &self.dispatcher, message_id).await;
    }

    fn spawn_read_marking(&self, message_ids: Vec<String>) {
        if message_ids.is_empty() {
            return;
        }
        debug!("Marking {} inbound messages read", message_ids.len());

        let thread = self.thread.clone();
        let dispatcher = self.dispatcher.clone();
        let handle = tokio::spawn(async move {
            join_all(
                message_ids
                    .iter()
                    .map(|id| mark_one_read(&thread, &dispatcher, id)),
            )
            .await;
        });

        if let Ok(mut pending) = self.read_marks.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Wait for background read-marking started by thread loads so far
    pub async fn settle_read_marks(&self) {
        let pending: Vec<JoinHandle<()>> = match self.read_marks.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                warn!("Read-marking task failed: {}", e);
            }
        }
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            directory: self.directory.view().await,
            thread: self.thread.view().await,
            draft: self.draft().await,
            sending: self.dispatcher.is_sending(),
        }
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }
}

async fn mark_one_read(thread: &ThreadLoader, dispatcher: &MessageDispatcher, message_id: &str) {
    thread.flip_read(message_id).await;
    if let Err(e) = dispatcher.mark_read(message_id).await {
        warn!("Failed to mark message {} read: {}", message_id, e);
    }
}
