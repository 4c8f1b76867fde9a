//! Vocabulary shared by every chatsync crate: identities, message ids,
//! the error taxonomy and the wire shapes spoken by the chat server.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::{ProtocolError, SyncError};
pub use models::{ConversationSummary, Message, SelfProfile};
pub use protocol::InboundEvent;
pub use types::{ConnectionState, ContentKind, MessageId, UserId};
