use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A counterparty from the "my conversations" listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub public_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_messages_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
}

impl Contact {
    pub fn new(public_id: &str, name: &str) -> Self {
        Contact {
            public_id: public_id.to_string(),
            name: name.to_string(),
            unread_messages_count: None,
            avatar: None,
            online: None,
        }
    }

    /// Count to show on the badge. Only what the backend reported, and only when non-zero.
    pub fn unread_badge(&self) -> Option<u32> {
        self.unread_messages_count.filter(|count| *count > 0)
    }
}

/// Participant reference embedded in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserRef {
    pub fn new(public_id: &str) -> Self {
        UserRef {
            public_id: public_id.to_string(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub public_id: String,
    pub message: String,
    pub status: MessageStatus,
    pub user_from: UserRef,
    pub user_to: UserRef,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_from(&self, user_id: &str) -> bool {
        self.user_from.public_id == user_id
    }

    /// Inbound for `user_id` and not yet read
    pub fn awaits_read_by(&self, user_id: &str) -> bool {
        self.user_to.public_id == user_id && self.status != MessageStatus::Read
    }
}

// Variant order is the lifecycle order: SENT -> DELIVERED -> READ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Move forward to `next`. Returns false (and stays put) for anything that would regress or repeat.
    pub fn advance_to(&mut self, next: MessageStatus) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// Body of the send call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub user_from_id: String,
    pub user_to_id: String,
    pub message: String,
}

/// True when `created_at` never decreases along the slice.
pub fn is_chronological(messages: &[Message]) -> bool {
    messages
        .windows(2)
        .all(|pair| pair[0].created_at <= pair[1].created_at)
}
