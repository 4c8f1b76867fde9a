//! Records owned by the [`ConversationStore`](crate::ConversationStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatsync_shared::models::Message;
use chatsync_shared::types::{MessageId, UserId};

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Where a stored message stands with respect to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Delivery {
    /// Optimistic placeholder awaiting the submission result.
    Pending,
    /// Known to the server.
    Confirmed,
    /// Submission failed; the placeholder stays until retried or discarded.
    Failed { reason: String, retryable: bool },
}

impl Delivery {
    pub fn is_failed(&self) -> bool {
        matches!(self, Delivery::Failed { .. })
    }
}

/// A message plus its delivery state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntry {
    pub message: Message,
    pub delivery: Delivery,
}

impl MessageEntry {
    /// Placeholders start pending, everything else is confirmed.
    pub fn new(message: Message) -> Self {
        let delivery = if message.id.is_placeholder() {
            Delivery::Pending
        } else {
            Delivery::Confirmed
        };
        Self { message, delivery }
    }

    pub fn id(&self) -> &MessageId {
        &self.message.id
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Preview line shown in the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastActivity {
    pub preview: String,
    pub at: DateTime<Utc>,
}

/// One-to-one conversation with a counterpart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub counterpart: UserId,
    /// Name from the friends list, if one was provided.
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub(crate) messages: Vec<MessageEntry>,
    pub(crate) unread: u32,
    pub(crate) last_activity: Option<LastActivity>,
}

impl Conversation {
    pub fn new(counterpart: UserId) -> Self {
        Self {
            counterpart,
            display_name: None,
            avatar_ref: None,
            messages: Vec::new(),
            unread: 0,
            last_activity: None,
        }
    }

    /// Messages in chronological order.
    pub fn messages(&self) -> &[MessageEntry] {
        &self.messages
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn last_activity(&self) -> Option<&LastActivity> {
        self.last_activity.as_ref()
    }

    /// Friends-list name, falling back to the raw identity.
    pub fn title(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.counterpart.as_str())
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub(crate) fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|e| e.id() == id)
    }

    pub(crate) fn touch(&mut self, message: &Message) {
        let newer = self
            .last_activity
            .as_ref()
            .map_or(true, |last| message.created_at >= last.at);
        if newer {
            self.last_activity = Some(LastActivity {
                preview: message.preview(),
                at: message.created_at,
            });
        }
    }

    /// Recompute the preview from the newest remaining message.
    pub(crate) fn refresh_activity(&mut self) {
        if let Some(last) = self.messages.iter().max_by_key(|e| e.message.created_at) {
            self.last_activity = Some(LastActivity {
                preview: last.message.preview(),
                at: last.message.created_at,
            });
        }
    }
}

/// Outcome of [`ConversationStore::reconcile`](crate::ConversationStore::reconcile).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The placeholder was replaced in place by the confirmed message.
    Replaced,
    /// The confirmed message had already arrived; the placeholder was dropped.
    Deduplicated,
    /// No placeholder was found; the confirmed message was appended.
    Appended,
    /// No placeholder, and the confirmed message was already stored.
    Unchanged,
}
