//! The message synchronizer.
//!
//! A single task owns the session, the conversation store and the focused
//! counterpart. It `select!`s over three inputs:
//!
//! - transport notifications from the connection manager,
//! - [`UiIntent`]s from the front-end,
//! - [`Completion`]s from REST calls it spawned earlier.
//!
//! REST calls never block the loop. Each one runs in its own task and reports
//! back through the completion channel, so every store mutation happens on the
//! loop. Completions carry the counterpart they were issued for and are
//! applied to that conversation even if focus has moved since.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chatsync_net::{ChatApi, FetchOptions, TransportNotification};
use chatsync_shared::constants::MAX_UPLOAD_SIZE;
use chatsync_shared::error::{Result, SyncError};
use chatsync_shared::models::{ConversationSummary, Message};
use chatsync_shared::protocol::InboundEvent;
use chatsync_shared::types::{ConnectionState, ContentKind, MessageId, UserId};
use chatsync_store::{ConversationStore, Reconciled};

use crate::events::{emit, ViewSender, ViewUpdate};
use crate::projector::{self, DisplayRecord, RetryHandle, ViewerContext};
use crate::session::Session;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiIntent {
    Focus(UserId),
    Send {
        content: String,
        kind: ContentKind,
    },
    SendAttachment {
        bytes: Bytes,
        file_name: String,
        kind: ContentKind,
    },
    Retry(RetryHandle),
    Discard(RetryHandle),
    LoadFullHistory,
    AvatarChanged(Option<String>),
    Close,
}

/// Result of a spawned REST call.
#[derive(Debug)]
pub enum Completion {
    Submitted {
        counterpart: UserId,
        placeholder: Uuid,
        result: Result<Message>,
    },
    HistoryLoaded {
        counterpart: UserId,
        result: Result<Vec<Message>>,
    },
    SummariesLoaded(Result<Vec<ConversationSummary>>),
    Uploaded {
        counterpart: UserId,
        kind: ContentKind,
        result: Result<String>,
    },
    UnreadCounts(Result<Vec<(UserId, u32)>>),
}

pub struct Synchronizer {
    session: Session,
    api: Arc<dyn ChatApi>,
    store: ConversationStore,
    focused: Option<UserId>,
    connection: ConnectionState,
    /// Set after the first `Connected`; later ones are reconnects.
    has_connected: bool,
    updates: ViewSender,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Synchronizer {
    pub fn new(
        session: Session,
        api: Arc<dyn ChatApi>,
        updates: ViewSender,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, completion_rx) = mpsc::unbounded_channel();
        let sync = Self {
            session,
            api,
            store: ConversationStore::new(),
            focused: None,
            connection: ConnectionState::Disconnected,
            has_connected: false,
            updates,
            completions,
        };
        (sync, completion_rx)
    }

    /// Kick off the conversation-list fetch.
    pub fn start(&mut self) {
        let api = Arc::clone(&self.api);
        self.spawn(async move { Completion::SummariesLoaded(api.list_conversation_summaries().await) });
    }

    /// Drive the loop until the front-end closes or sends [`UiIntent::Close`].
    pub async fn run(
        mut self,
        mut transport: mpsc::Receiver<TransportNotification>,
        mut intents: mpsc::Receiver<UiIntent>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) -> Self {
        self.start();
        let mut transport_open = true;

        loop {
            tokio::select! {
                notification = transport.recv(), if transport_open => match notification {
                    Some(n) => self.on_transport(n),
                    None => {
                        debug!("Transport channel closed");
                        transport_open = false;
                    }
                },
                intent = intents.recv() => match intent {
                    Some(UiIntent::Close) | None => {
                        info!("Conversation view closed");
                        break;
                    }
                    Some(intent) => self.on_intent(intent),
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
            }
        }
        self
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn unread(&self, counterpart: &UserId) -> u32 {
        self.store.unread(counterpart)
    }

    pub fn focused(&self) -> Option<&UserId> {
        self.focused.as_ref()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Display records for the focused conversation; empty when nothing is focused.
    pub fn focused_records(&self, now: DateTime<Utc>) -> Vec<DisplayRecord> {
        self.focused
            .as_ref()
            .map(|c| self.records_for(c, now))
            .unwrap_or_default()
    }

    fn records_for(&self, counterpart: &UserId, now: DateTime<Utc>) -> Vec<DisplayRecord> {
        let Some(conv) = self.store.get(counterpart) else {
            return Vec::new();
        };
        let viewer = ViewerContext {
            self_id: self.session.self_id(),
            self_avatar: self.session.avatar(),
        };
        projector::project(conv.messages(), viewer, &self.session.config().projector(), now)
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn on_transport(&mut self, notification: TransportNotification) {
        match notification {
            TransportNotification::StateChanged(state) => self.on_state_changed(state),
            TransportNotification::Event(InboundEvent::NewMessage(message)) => {
                self.route_inbound(message)
            }
            TransportNotification::Event(InboundEvent::UnreadDelta { counterpart, delta }) => {
                if self.is_focused(&counterpart) {
                    debug!(counterpart = %counterpart, "Unread update for focused conversation ignored");
                    return;
                }
                let count = self.store.increment_unread(&counterpart, delta);
                self.emit_unread(&counterpart, count);
            }
        }
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }
        info!(from = %self.connection, to = %state, "Connection state changed");
        self.connection = state;
        emit(&self.updates, ViewUpdate::ConnectionChanged(state));

        if state != ConnectionState::Connected {
            return;
        }
        // Anything pushed while we were away is only recoverable by refetching.
        if self.has_connected {
            if let Some(counterpart) = self.focused.clone() {
                self.fetch_history(counterpart, FetchOptions { mark_read: true, history: false });
            }
        }
        self.has_connected = true;

        let api = Arc::clone(&self.api);
        self.spawn(async move { Completion::UnreadCounts(api.fetch_unread_counts().await) });
    }

    fn route_inbound(&mut self, message: Message) {
        let self_id = self.session.self_id().clone();
        let counterpart = message.counterpart_for(&self_id).clone();
        let is_echo = message.is_from(&self_id);

        if self.is_focused(&counterpart) {
            let had_unread = self.store.unread(&counterpart) > 0;
            let appended = self.store.append_message(&counterpart, message);
            self.store.clear_unread(&counterpart);
            if had_unread {
                self.emit_unread(&counterpart, 0);
            }
            if appended {
                self.emit_messages(&counterpart);
            }
        } else if !is_echo {
            let count = self.store.increment_unread(&counterpart, 1);
            debug!(counterpart = %counterpart, unread = count, "Message for background conversation");
            self.emit_unread(&counterpart, count);
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    pub fn on_intent(&mut self, intent: UiIntent) {
        let outcome = match intent {
            UiIntent::Focus(counterpart) => {
                self.focus(counterpart);
                Ok(())
            }
            UiIntent::Send { content, kind } => self
                .require_focus()
                .and_then(|counterpart| self.send(counterpart, content, kind))
                .map(|_| ()),
            UiIntent::SendAttachment { bytes, file_name, kind } => self
                .require_focus()
                .and_then(|counterpart| self.upload(counterpart, bytes, file_name, kind)),
            UiIntent::Retry(handle) => self.retry(handle),
            UiIntent::Discard(handle) => self.discard(handle),
            UiIntent::LoadFullHistory => self.require_focus().map(|counterpart| {
                self.fetch_history(counterpart, FetchOptions { mark_read: true, history: true })
            }),
            UiIntent::AvatarChanged(avatar) => {
                self.session.set_avatar(avatar);
                if let Some(counterpart) = self.focused.clone() {
                    self.emit_messages(&counterpart);
                }
                Ok(())
            }
            // Handled by the run loop.
            UiIntent::Close => Ok(()),
        };

        if let Err(e) = outcome {
            self.report(e);
        }
    }

    fn focus(&mut self, counterpart: UserId) {
        info!(counterpart = %counterpart, "Conversation focused");
        self.store.ensure(&counterpart);
        self.store.clear_unread(&counterpart);
        self.focused = Some(counterpart.clone());

        self.emit_unread(&counterpart, 0);
        self.emit_messages(&counterpart);
        self.emit_list();
        self.fetch_history(counterpart, FetchOptions { mark_read: true, history: false });
    }

    fn require_focus(&self) -> Result<UserId> {
        self.focused
            .clone()
            .ok_or_else(|| SyncError::Validation("no conversation selected".into()))
    }

    /// Optimistic send: append a placeholder now, submit in the background.
    fn send(&mut self, counterpart: UserId, content: String, kind: ContentKind) -> Result<Uuid> {
        if content.trim().is_empty() {
            return Err(SyncError::Validation("message is empty".into()));
        }

        let local = Uuid::new_v4();
        let placeholder = Message {
            id: MessageId::Placeholder(local),
            sender: self.session.self_id().clone(),
            recipient: counterpart.clone(),
            content: content.clone(),
            kind,
            created_at: Utc::now(),
            sender_avatar: None,
        };
        self.store.append_message(&counterpart, placeholder);
        debug!(counterpart = %counterpart, %local, kind = kind.label(), "Placeholder appended");
        if self.is_focused(&counterpart) {
            self.emit_messages(&counterpart);
        }

        let api = Arc::clone(&self.api);
        let self_id = self.session.self_id().clone();
        self.spawn(async move {
            let result = api.submit_message(&self_id, &counterpart, kind, &content).await;
            Completion::Submitted {
                counterpart,
                placeholder: local,
                result,
            }
        });
        Ok(local)
    }

    fn upload(
        &mut self,
        counterpart: UserId,
        bytes: Bytes,
        file_name: String,
        kind: ContentKind,
    ) -> Result<()> {
        if kind == ContentKind::Text {
            return Err(SyncError::Validation("attachments must be images or files".into()));
        }
        if bytes.is_empty() {
            return Err(SyncError::Validation(format!("{file_name} is empty")));
        }
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(SyncError::Validation(format!(
                "{file_name} exceeds the {} MiB upload limit",
                MAX_UPLOAD_SIZE / (1024 * 1024)
            )));
        }

        info!(counterpart = %counterpart, file = %file_name, size = bytes.len(), "Uploading attachment");
        let api = Arc::clone(&self.api);
        self.spawn(async move {
            let result = api.upload_attachment(bytes, &file_name).await;
            Completion::Uploaded {
                counterpart,
                kind,
                result,
            }
        });
        Ok(())
    }

    fn retry(&mut self, handle: RetryHandle) -> Result<()> {
        let (counterpart, message) = self.take_failed(handle)?;
        info!(counterpart = %counterpart, "Retrying failed send");
        self.send(counterpart, message.content, message.kind).map(|_| ())
    }

    fn discard(&mut self, handle: RetryHandle) -> Result<()> {
        let (counterpart, _) = self.take_failed(handle)?;
        if self.is_focused(&counterpart) {
            self.emit_messages(&counterpart);
        }
        Ok(())
    }

    /// Remove a failed placeholder, returning its conversation and content.
    fn take_failed(&mut self, handle: RetryHandle) -> Result<(UserId, Message)> {
        let local = handle.placeholder();
        let counterpart = match self.store.find_placeholder(local) {
            Some((counterpart, entry)) if entry.delivery.is_failed() => counterpart.clone(),
            Some(_) => return Err(SyncError::Validation("message is still being sent".into())),
            None => return Err(SyncError::Validation("message no longer exists".into())),
        };
        let message = self
            .store
            .remove_placeholder(&counterpart, local)
            .ok_or_else(|| SyncError::Validation("message no longer exists".into()))?;
        Ok((counterpart, message))
    }

    fn fetch_history(&mut self, counterpart: UserId, options: FetchOptions) {
        debug!(counterpart = %counterpart, ?options, "Fetching history");
        let api = Arc::clone(&self.api);
        let self_id = self.session.self_id().clone();
        self.spawn(async move {
            let result = api.fetch_messages(&self_id, &counterpart, options).await;
            Completion::HistoryLoaded { counterpart, result }
        });
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    pub fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Submitted {
                counterpart,
                placeholder,
                result: Ok(confirmed),
            } => {
                let outcome = self.store.reconcile(&counterpart, placeholder, confirmed);
                if outcome != Reconciled::Unchanged && self.is_focused(&counterpart) {
                    self.emit_messages(&counterpart);
                }
            }
            Completion::Submitted {
                counterpart,
                placeholder,
                result: Err(e),
            } => {
                warn!(counterpart = %counterpart, %placeholder, error = %e, "Send failed");
                if !self
                    .store
                    .mark_failed(&counterpart, placeholder, e.to_string(), e.is_retryable())
                {
                    return;
                }
                emit(
                    &self.updates,
                    ViewUpdate::SendFailed {
                        counterpart: counterpart.clone(),
                        handle: RetryHandle::new(placeholder),
                        error: e.to_string(),
                        retryable: e.is_retryable(),
                    },
                );
                if e.requires_reauth() {
                    emit(&self.updates, ViewUpdate::ReauthRequired(e.to_string()));
                }
                if self.is_focused(&counterpart) {
                    self.emit_messages(&counterpart);
                }
            }
            Completion::HistoryLoaded {
                counterpart,
                result: Ok(messages),
            } => {
                let added = self.store.merge_history(&counterpart, messages);
                // Only the focused fetch asked the server to mark it read.
                if self.is_focused(&counterpart) {
                    let had_unread = self.store.unread(&counterpart) > 0;
                    self.store.clear_unread(&counterpart);
                    if had_unread {
                        self.emit_unread(&counterpart, 0);
                    }
                    if added > 0 {
                        self.emit_messages(&counterpart);
                    }
                }
            }
            Completion::HistoryLoaded {
                counterpart,
                result: Err(e),
            } => {
                warn!(counterpart = %counterpart, error = %e, "History fetch failed");
                self.report(e);
            }
            Completion::SummariesLoaded(Ok(summaries)) => {
                info!(count = summaries.len(), "Conversation list loaded");
                self.store.upsert_conversations(summaries);
                self.emit_list();
            }
            Completion::Uploaded {
                counterpart,
                kind,
                result: Ok(url),
            } => {
                if let Err(e) = self.send(counterpart, url, kind) {
                    self.report(e);
                }
            }
            Completion::UnreadCounts(Ok(counts)) => self.apply_unread_counts(counts),
            Completion::SummariesLoaded(Err(e))
            | Completion::Uploaded { result: Err(e), .. }
            | Completion::UnreadCounts(Err(e)) => self.report(e),
        }
    }

    /// Server snapshot: counters only ever move up, and never for the focused view.
    fn apply_unread_counts(&mut self, counts: Vec<(UserId, u32)>) {
        for (counterpart, server) in counts {
            if self.is_focused(&counterpart) {
                continue;
            }
            let local = self.store.unread(&counterpart);
            if server > local {
                self.store.set_unread(&counterpart, server);
                self.emit_unread(&counterpart, server);
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn is_focused(&self, counterpart: &UserId) -> bool {
        self.focused.as_ref() == Some(counterpart)
    }

    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions.clone();
        tokio::spawn(async move {
            // The receiver only goes away when the loop has exited.
            let _ = tx.send(fut.await);
        });
    }

    fn report(&self, e: SyncError) {
        if e.requires_reauth() {
            warn!(error = %e, "Credential rejected");
            emit(&self.updates, ViewUpdate::ReauthRequired(e.to_string()));
        } else {
            debug!(kind = e.kind(), error = %e, "Reporting transient error");
            emit(&self.updates, ViewUpdate::Notice(e.to_string()));
        }
    }

    fn emit_unread(&self, counterpart: &UserId, count: u32) {
        emit(
            &self.updates,
            ViewUpdate::UnreadChanged {
                counterpart: counterpart.clone(),
                count,
            },
        );
    }

    fn emit_messages(&self, counterpart: &UserId) {
        emit(
            &self.updates,
            ViewUpdate::MessagesChanged {
                counterpart: counterpart.clone(),
                records: self.records_for(counterpart, Utc::now()),
            },
        );
    }

    fn emit_list(&self) {
        let rows = projector::project_conversation_list(
            &self.store,
            self.focused.as_ref(),
            &self.session.config().projector(),
            Utc::now(),
        );
        emit(&self.updates, ViewUpdate::ConversationList(rows));
    }
}
