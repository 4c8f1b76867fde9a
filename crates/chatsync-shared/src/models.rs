//! Canonical domain records.
//!
//! Everything the server sends is normalized into these shapes by
//! [`crate::protocol`] before the rest of the workspace sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContentKind, MessageId, UserId};

/// A single one-to-one chat message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub recipient: UserId,
    /// Text, or the URL of an uploaded image/file.
    pub content: String,
    pub kind: ContentKind,
    pub created_at: DateTime<Utc>,
    /// Avatar attached to the payload by the server, if any.
    pub sender_avatar: Option<String>,
}

impl Message {
    /// Direction is always derived from identities, never from a wire flag.
    pub fn is_from(&self, identity: &UserId) -> bool {
        self.sender == *identity
    }

    /// The other party of this message as seen from `self_id`.
    pub fn counterpart_for<'a>(&'a self, self_id: &UserId) -> &'a UserId {
        if self.is_from(self_id) {
            &self.recipient
        } else {
            &self.sender
        }
    }

    /// Short text for the conversation list.
    pub fn preview(&self) -> String {
        match self.kind {
            ContentKind::Text => self.content.chars().take(40).collect(),
            other => format!("[{}]", other.label()),
        }
    }
}

/// The signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelfProfile {
    pub identity: UserId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// One row of the friends list as reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub counterpart: UserId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}
