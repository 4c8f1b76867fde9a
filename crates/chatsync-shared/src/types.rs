use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = opaque token issued by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message identifier.
///
/// `Placeholder` ids are generated locally for optimistic sends and must be
/// reconciled against a `Confirmed` id (or discarded) before the message is
/// durable. They are never rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageId {
    Confirmed(String),
    Placeholder(Uuid),
}

impl MessageId {
    pub fn placeholder() -> Self {
        Self::Placeholder(Uuid::new_v4())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn as_confirmed(&self) -> Option<&str> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Placeholder(_) => None,
        }
    }

    pub fn as_placeholder(&self) -> Option<Uuid> {
        match self {
            Self::Placeholder(local) => Some(*local),
            Self::Confirmed(_) => None,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed(id) => f.write_str(id),
            Self::Placeholder(local) => write!(f, "local:{local}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    File,
}

impl ContentKind {
    /// Numeric code used on the wire (1 text, 2 image, 3 file).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Text),
            2 => Some(Self::Image),
            3 => Some(Self::File),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Text => 1,
            Self::Image => 2,
            Self::File => 3,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_codes() {
        for kind in [ContentKind::Text, ContentKind::Image, ContentKind::File] {
            assert_eq!(ContentKind::from_code(kind.code() as i64), Some(kind));
            assert_eq!(ContentKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(ContentKind::from_code(9), None);
        assert_eq!(ContentKind::from_label("Image"), Some(ContentKind::Image));
    }

    #[test]
    fn test_placeholder_ids_are_distinct() {
        let a = MessageId::placeholder();
        let b = MessageId::placeholder();
        assert_ne!(a, b);
        assert!(a.is_placeholder());
        assert_eq!(a.as_confirmed(), None);
        assert_eq!(MessageId::Confirmed("m1".into()).as_confirmed(), Some("m1"));
    }

    #[test]
    fn test_short_user_id() {
        assert_eq!(UserId::from("123456789012").short(), "12345678");
        assert_eq!(UserId::from("42").short(), "42");
    }
}
