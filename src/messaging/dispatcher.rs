// Message dispatcher
// Sends outbound messages (one at a time) and requests read transitions.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::api::MessagesApi;
use super::MessagingError;
use crate::models::{Message, SendMessageRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The backend accepted the message and returned its confirmed form
    Sent(Message),
    /// Another send was still in flight; nothing was submitted
    Ignored,
}

/// Clears the in-flight flag on every exit path
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct MessageDispatcher {
    api: Arc<dyn MessagesApi>,
    sending: AtomicBool,
}

impl MessageDispatcher {
    pub fn new(api: Arc<dyn MessagesApi>) -> Self {
        MessageDispatcher {
            api,
            sending: AtomicBool::new(false),
        }
    }

    /// Check a send locally. Nothing here touches the network.
    pub fn validate(from_id: &str, to_id: &str, text: &str) -> Result<(), MessagingError> {
        if from_id.trim().is_empty() {
            return Err(MessagingError::Validation("no active session".to_string()));
        }
        if to_id.trim().is_empty() {
            return Err(MessagingError::Validation("no contact selected".to_string()));
        }
        if text.trim().is_empty() {
            return Err(MessagingError::Validation("message cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Send `text` from `from_id` to `to_id`.
    ///
    /// A call made while a previous send is outstanding returns `SendOutcome::Ignored`
    /// without contacting the backend.
    pub async fn send_message(&self, from_id: &str, to_id: &str, text: &str) -> Result<SendOutcome, MessagingError> {
        Self::validate(from_id, to_id, text)?;

        let _guard = match InFlightGuard::acquire(&self.sending) {
            Some(guard) => guard,
            None => {
                debug!("Send to {} ignored, another send is in flight", to_id);
                return Ok(SendOutcome::Ignored);
            }
        };

        let request = SendMessageRequest {
            user_from_id: from_id.to_string(),
            user_to_id: to_id.to_string(),
            message: text.to_string(),
        };
        match self.api.send_message(&request).await {
            Ok(message) => {
                info!("Message {} sent to {}", message.public_id, to_id);
                Ok(SendOutcome::Sent(message))
            }
            Err(e) => {
                warn!("Failed to send message to {}: {}", to_id, e);
                Err(e)
            }
        }
    }

    /// Ask the backend to mark `message_id` read. Repeating it is harmless.
    pub async fn mark_read(&self, message_id: &str) -> Result<(), MessagingError> {
        self.api.mark_read(message_id).await?;
        debug!("Message {} marked read", message_id);
        Ok(())
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_input() {
        assert!(MessageDispatcher::validate("me", "you", "hello").is_ok());
        assert!(matches!(
            MessageDispatcher::validate("me", "you", " \t\n"),
            Err(MessagingError::Validation(_))
        ));
        assert!(matches!(
            MessageDispatcher::validate("me", "", "hello"),
            Err(MessagingError::Validation(_))
        ));
        assert!(matches!(
            MessageDispatcher::validate("", "you", "hello"),
            Err(MessagingError::Validation(_))
        ));
    }

    #[test]
    fn test_in_flight_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        {
            let first = InFlightGuard::acquire(&flag);
            assert!(first.is_some());
            assert!(InFlightGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
