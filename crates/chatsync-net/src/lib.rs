// Realtime transport and REST plumbing for the chat server.

pub mod api;
pub mod backoff;
pub mod connection;

pub use api::{ChatApi, FetchOptions, HttpApi};
pub use backoff::{Backoff, BackoffConfig};
pub use connection::{ConnectionConfig, ConnectionManager, TransportCommand, TransportNotification};
