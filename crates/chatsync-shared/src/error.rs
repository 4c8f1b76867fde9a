use thiserror::Error;

use crate::constants::{
    CODE_INVALID_PARAM, CODE_INVALID_TOKEN, CODE_IS_NOT_FRIEND, CODE_NEED_LOGIN,
};

/// Failure taxonomy of the synchronization core.
///
/// None of these is fatal: transport failures are recovered by the
/// reconnect loop, submission and fetch failures become view state, and
/// data-integrity failures are dropped at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}

impl SyncError {
    /// Map a non-success envelope code to the taxonomy.
    pub fn from_code(code: i64, msg: &str) -> Self {
        let detail = if msg.is_empty() {
            format!("code {code}")
        } else {
            format!("{msg} (code {code})")
        };
        match code {
            CODE_NEED_LOGIN | CODE_INVALID_TOKEN => Self::Auth(detail),
            CODE_INVALID_PARAM | CODE_IS_NOT_FRIEND => Self::Validation(detail),
            _ => Self::Server(detail),
        }
    }

    /// Map an HTTP status that carried no usable envelope.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        match status {
            401 | 403 => Self::Auth(detail),
            400..=499 => Self::Validation(detail),
            _ => Self::Server(detail),
        }
    }

    /// Whether the user may sensibly try the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server(_))
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Auth(_) => "auth",
            Self::Validation(_) => "validation",
            Self::Server(_) => "server",
            Self::DataIntegrity(_) => "data_integrity",
        }
    }
}

/// Errors raised while normalizing server payloads into canonical types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    Json(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Unknown content kind: {0}")]
    UnknownKind(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        Self::DataIntegrity(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SyncError>;
