//! The [`ConversationStore`]: per-counterpart message logs and unread counters.

use std::collections::HashMap;

use tracing::{debug, trace};
use uuid::Uuid;

use chatsync_shared::models::{ConversationSummary, Message};
use chatsync_shared::types::{MessageId, UserId};

use crate::models::{Conversation, Delivery, LastActivity, MessageEntry, Reconciled};

/// At most one [`Conversation`] per counterpart; unknown counterparts are
/// created on first touch.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<UserId, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get(&self, counterpart: &UserId) -> Option<&Conversation> {
        self.conversations.get(counterpart)
    }

    /// Unread count, zero for conversations the store has never seen.
    pub fn unread(&self, counterpart: &UserId) -> u32 {
        self.get(counterpart).map_or(0, Conversation::unread)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Locate a placeholder in any conversation.
    pub fn find_placeholder(&self, placeholder: Uuid) -> Option<(&UserId, &MessageEntry)> {
        let id = MessageId::Placeholder(placeholder);
        self.conversations.values().find_map(|conv| {
            conv.position(&id)
                .map(|idx| (&conv.counterpart, &conv.messages[idx]))
        })
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    pub fn ensure(&mut self, counterpart: &UserId) -> &Conversation {
        self.entry(counterpart)
    }

    /// Apply friends-list rows. Messages and unread counters are untouched.
    pub fn upsert_conversations<I>(&mut self, summaries: I)
    where
        I: IntoIterator<Item = ConversationSummary>,
    {
        for summary in summaries {
            let conv = self.entry(&summary.counterpart);
            conv.display_name = Some(summary.display_name);
            if summary.avatar_ref.is_some() {
                conv.avatar_ref = summary.avatar_ref;
            }
            if conv.last_activity.is_none() {
                conv.last_activity = summary.last_activity_at.map(|at| LastActivity {
                    preview: String::new(),
                    at,
                });
            }
        }
        debug!(conversations = self.len(), "Conversation list applied");
    }

    /// Append unless a message with the same id is already present.
    ///
    /// Returns `true` when the log changed.
    pub fn append_message(&mut self, counterpart: &UserId, message: Message) -> bool {
        let conv = self.entry(counterpart);
        if conv.contains(&message.id) {
            trace!(counterpart = %counterpart, id = %message.id, "Duplicate message ignored");
            return false;
        }
        conv.touch(&message);
        conv.messages.push(MessageEntry::new(message));
        true
    }

    /// Idempotently merge a history page, then restore timestamp order.
    ///
    /// Returns the number of messages that were new.
    pub fn merge_history(&mut self, counterpart: &UserId, messages: Vec<Message>) -> usize {
        let conv = self.entry(counterpart);
        let mut added = 0;
        for message in messages {
            if conv.contains(&message.id) {
                continue;
            }
            conv.touch(&message);
            conv.messages.push(MessageEntry::new(message));
            added += 1;
        }
        if added > 0 {
            conv.messages.sort_by_key(|e| e.message.created_at);
        }
        debug!(counterpart = %counterpart, added, total = conv.messages.len(), "History merged");
        added
    }

    /// Swap a placeholder for the server's confirmed message.
    ///
    /// Correlation is by placeholder id only. If the confirmed message is
    /// already stored (the realtime echo won the race), the placeholder is
    /// dropped instead so exactly one copy remains.
    pub fn reconcile(
        &mut self,
        counterpart: &UserId,
        placeholder: Uuid,
        confirmed: Message,
    ) -> Reconciled {
        let conv = self.entry(counterpart);
        let local = conv.position(&MessageId::Placeholder(placeholder));
        let already = conv.contains(&confirmed.id);

        let outcome = match (local, already) {
            (Some(idx), false) => {
                conv.touch(&confirmed);
                conv.messages[idx] = MessageEntry::new(confirmed);
                Reconciled::Replaced
            }
            (Some(idx), true) => {
                conv.messages.remove(idx);
                conv.refresh_activity();
                Reconciled::Deduplicated
            }
            (None, false) => {
                conv.touch(&confirmed);
                conv.messages.push(MessageEntry::new(confirmed));
                Reconciled::Appended
            }
            (None, true) => Reconciled::Unchanged,
        };
        debug!(counterpart = %counterpart, %placeholder, ?outcome, "Placeholder reconciled");
        outcome
    }

    /// Flag a placeholder as failed. Returns `false` if it no longer exists.
    pub fn mark_failed(
        &mut self,
        counterpart: &UserId,
        placeholder: Uuid,
        reason: impl Into<String>,
        retryable: bool,
    ) -> bool {
        let Some(conv) = self.conversations.get_mut(counterpart) else {
            return false;
        };
        let Some(idx) = conv.position(&MessageId::Placeholder(placeholder)) else {
            return false;
        };
        conv.messages[idx].delivery = Delivery::Failed {
            reason: reason.into(),
            retryable,
        };
        true
    }

    /// Remove a placeholder, returning the message it carried.
    pub fn remove_placeholder(&mut self, counterpart: &UserId, placeholder: Uuid) -> Option<Message> {
        let conv = self.conversations.get_mut(counterpart)?;
        let idx = conv.position(&MessageId::Placeholder(placeholder))?;
        let entry = conv.messages.remove(idx);
        conv.refresh_activity();
        Some(entry.message)
    }

    pub fn set_unread(&mut self, counterpart: &UserId, count: u32) {
        self.entry(counterpart).unread = count;
    }

    /// Saturating increment; returns the new count.
    pub fn increment_unread(&mut self, counterpart: &UserId, delta: u32) -> u32 {
        let conv = self.entry(counterpart);
        conv.unread = conv.unread.saturating_add(delta);
        conv.unread
    }

    pub fn clear_unread(&mut self, counterpart: &UserId) {
        if let Some(conv) = self.conversations.get_mut(counterpart) {
            conv.unread = 0;
        }
    }

    fn entry(&mut self, counterpart: &UserId) -> &mut Conversation {
        self.conversations
            .entry(counterpart.clone())
            .or_insert_with(|| Conversation::new(counterpart.clone()))
    }
}
