//! # chatsync-store
//!
//! In-memory conversation state for the chat client.
//!
//! The store is the single owner of conversation and message records. Every
//! mutation is one `&mut self` call, so a reader holding `&ConversationStore`
//! never observes a half-applied update. Appends are keyed by message id and
//! are idempotent: the same message delivered by history backfill, the
//! realtime stream and a send confirmation is stored once.

pub mod conversations;
pub mod models;

pub use conversations::ConversationStore;
pub use models::*;
