//! View updates pushed from the synchronizer to whatever renders it.

use serde::Serialize;
use tokio::sync::mpsc;

use chatsync_shared::types::{ConnectionState, UserId};

use crate::projector::{ConversationRow, DisplayRecord, RetryHandle};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ViewUpdate {
    ConnectionChanged(ConnectionState),
    UnreadChanged {
        counterpart: UserId,
        count: u32,
    },
    /// Fresh records for the focused conversation.
    MessagesChanged {
        counterpart: UserId,
        records: Vec<DisplayRecord>,
    },
    ConversationList(Vec<ConversationRow>),
    SendFailed {
        counterpart: UserId,
        handle: RetryHandle,
        error: String,
        retryable: bool,
    },
    /// Transient, non-fatal message for the user.
    Notice(String),
    /// The credential was rejected; the user has to sign in again.
    ReauthRequired(String),
}

pub type ViewSender = mpsc::UnboundedSender<ViewUpdate>;

pub fn emit(tx: &ViewSender, update: ViewUpdate) {
    if let Err(e) = tx.send(update) {
        tracing::debug!(error = %e, "View receiver closed, dropping update");
    }
}
