//! Wire shapes of the chat server and their normalization.
//!
//! The server (and older builds of it) answers with several spellings of the
//! same payload: numeric or string ids, `from`/`sender`, `{messages}` vs a
//! bare array, upload URLs at different depths. The `Wire*` types accept all
//! of them and `normalize` turns each into one canonical record, so nothing
//! past this module branches on field names.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{EVENT_NEW_MESSAGE, EVENT_UNREAD_UPDATE, FINGERPRINT_ID_PREFIX};
use crate::error::ProtocolError;
use crate::models::{ConversationSummary, Message, SelfProfile};
use crate::types::{ContentKind, MessageId, UserId};

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// An id sent either as a JSON number or a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }

    /// `None` for the empty string and `0`, which the server sends for
    /// unset integer keys.
    pub fn into_present(self) -> Option<String> {
        let s = self.into_string();
        (!s.is_empty() && s != "0").then_some(s)
    }

    fn into_user(self) -> Option<UserId> {
        self.into_present().map(UserId)
    }
}

/// A timestamp sent as unix seconds or as an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Unix(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn parse(&self) -> Result<DateTime<Utc>, ProtocolError> {
        match self {
            Self::Unix(secs) => Utc
                .timestamp_opt(*secs, 0)
                .single()
                .ok_or_else(|| ProtocolError::InvalidTimestamp(secs.to_string())),
            Self::Text(s) => {
                if let Ok(secs) = s.trim().parse::<i64>() {
                    return Self::Unix(secs).parse();
                }
                DateTime::parse_from_rfc3339(s.trim())
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| ProtocolError::InvalidTimestamp(s.clone()))
            }
        }
    }

    /// Like [`parse`](Self::parse), but Go's zero time counts as absent.
    fn parse_meaningful(&self) -> Option<DateTime<Utc>> {
        self.parse().ok().filter(|dt| dt.timestamp() > 0)
    }
}

/// Content kind sent as a numeric code or a label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireKind {
    Code(i64),
    Label(String),
}

impl WireKind {
    pub fn resolve(&self) -> Result<ContentKind, ProtocolError> {
        match self {
            Self::Code(code) => ContentKind::from_code(*code)
                .ok_or_else(|| ProtocolError::UnknownKind(code.to_string())),
            Self::Label(label) => ContentKind::from_label(label)
                .ok_or_else(|| ProtocolError::UnknownKind(label.clone())),
        }
    }
}

fn first_non_empty(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A chat message as the server spells it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub from: Option<WireId>,
    #[serde(default)]
    pub sender: Option<WireId>,
    #[serde(default)]
    pub to: Option<WireId>,
    #[serde(default)]
    pub receiver: Option<WireId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<WireKind>,
    #[serde(default)]
    pub created_at: Option<WireTimestamp>,
    /// 1 = self to counterpart, 2 = counterpart to self.
    #[serde(default)]
    pub direct: Option<u8>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// What the normalizer knows about the payload's surroundings.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub self_id: &'a UserId,
    /// Known when the payload answers a per-conversation request.
    pub counterpart: Option<&'a UserId>,
    /// Used when the payload carries no timestamp.
    pub received_at: DateTime<Utc>,
}

impl WireMessage {
    pub fn normalize(self, ctx: &NormalizeContext<'_>) -> Result<Message, ProtocolError> {
        let from = self.from.or(self.sender).and_then(WireId::into_user);
        let to = self.to.or(self.receiver).and_then(WireId::into_user);
        let (sender, recipient) = resolve_parties(from, to, self.direct, ctx)?;

        let kind = match &self.kind {
            Some(k) => k.resolve()?,
            None => ContentKind::Text,
        };

        let content = first_non_empty([self.file_url])
            .or(self.content)
            .ok_or(ProtocolError::MissingField("content"))?;

        let created_at = match &self.created_at {
            Some(ts) => ts.parse()?,
            None => ctx.received_at,
        };

        let id = match self.id.and_then(WireId::into_present) {
            Some(id) => MessageId::Confirmed(id),
            None => MessageId::Confirmed(fingerprint(&sender, &recipient, created_at, &content)),
        };

        Ok(Message {
            id,
            sender,
            recipient,
            content,
            kind,
            created_at,
            sender_avatar: first_non_empty([self.avatar_url]),
        })
    }
}

/// Fill in whichever party the payload left out.
///
/// Identities win whenever present; the `direct` flag is only consulted when
/// the payload names neither party.
fn resolve_parties(
    from: Option<UserId>,
    to: Option<UserId>,
    direct: Option<u8>,
    ctx: &NormalizeContext<'_>,
) -> Result<(UserId, UserId), ProtocolError> {
    let me = ctx.self_id.clone();
    match (from, to) {
        (Some(from), Some(to)) => Ok((from, to)),
        (Some(from), None) if from == me => ctx
            .counterpart
            .cloned()
            .map(|c| (from, c))
            .ok_or(ProtocolError::MissingField("to")),
        (Some(from), None) => Ok((from, me)),
        (None, Some(to)) if to == me => ctx
            .counterpart
            .cloned()
            .map(|c| (c, to))
            .ok_or(ProtocolError::MissingField("from")),
        (None, Some(to)) => Ok((me, to)),
        (None, None) => {
            let counterpart = ctx
                .counterpart
                .cloned()
                .ok_or(ProtocolError::MissingField("from"))?;
            match direct {
                Some(1) => Ok((me, counterpart)),
                Some(2) => Ok((counterpart, me)),
                Some(other) => Err(ProtocolError::InvalidField {
                    field: "direct",
                    value: other.to_string(),
                }),
                None => Err(ProtocolError::MissingField("from")),
            }
        }
    }
}

/// Stable identifier for payloads the server sent without one.
///
/// Only fields every payload shape carries take part: history entries have
/// no `type`, so the kind is left out.
pub fn fingerprint(
    sender: &UserId,
    recipient: &UserId,
    created_at: DateTime<Utc>,
    content: &str,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [
        sender.as_str(),
        recipient.as_str(),
        &created_at.timestamp().to_string(),
        content,
    ] {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    let digest = hasher.finalize();
    format!("{FINGERPRINT_ID_PREFIX}{}", hex::encode(&digest.as_bytes()[..16]))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMessageList {
    #[serde(default)]
    pub messages: Option<Vec<WireMessage>>,
}

/// History payload: a bare array, `{messages}`, or `{data: {messages}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireHistory {
    List(Vec<WireMessage>),
    Nested { data: WireMessageList },
    Wrapped(WireMessageList),
}

impl WireHistory {
    pub fn into_messages(self) -> Vec<WireMessage> {
        match self {
            Self::List(list) => list,
            Self::Nested { data } => data.messages.unwrap_or_default(),
            Self::Wrapped(inner) => inner.messages.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Realtime events
// ---------------------------------------------------------------------------

/// A normalized server push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage(Message),
    UnreadDelta { counterpart: UserId, delta: u32 },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireUnreadUpdate {
    #[serde(default)]
    friend_id: Option<WireId>,
    #[serde(default)]
    sender: Option<WireId>,
    #[serde(default)]
    count: Option<i64>,
    #[serde(default)]
    delta: Option<i64>,
}

/// Decode one realtime text frame `{type, data}`.
pub fn decode_event(
    text: &str,
    self_id: &UserId,
    received_at: DateTime<Utc>,
) -> Result<InboundEvent, ProtocolError> {
    let raw: RawEvent = serde_json::from_str(text)?;
    match raw.kind.as_str() {
        EVENT_NEW_MESSAGE => {
            let wire: WireMessage = serde_json::from_value(raw.data)?;
            let ctx = NormalizeContext {
                self_id,
                counterpart: None,
                received_at,
            };
            Ok(InboundEvent::NewMessage(wire.normalize(&ctx)?))
        }
        EVENT_UNREAD_UPDATE => {
            let wire: WireUnreadUpdate = serde_json::from_value(raw.data)?;
            let counterpart = wire
                .friend_id
                .or(wire.sender)
                .and_then(WireId::into_user)
                .ok_or(ProtocolError::MissingField("friend_id"))?;
            let raw_delta = wire.count.or(wire.delta).unwrap_or(1);
            let delta = u32::try_from(raw_delta).map_err(|_| ProtocolError::InvalidField {
                field: "count",
                value: raw_delta.to_string(),
            })?;
            Ok(InboundEvent::UnreadDelta { counterpart, delta })
        }
        other => Err(ProtocolError::UnknownEvent(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// REST payloads
// ---------------------------------------------------------------------------

/// Standard response envelope `{code, msg, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireSelf {
    #[serde(default)]
    pub user_id: Option<WireId>,
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl WireSelf {
    pub fn normalize(self) -> Result<SelfProfile, ProtocolError> {
        let identity = self
            .user_id
            .or(self.id)
            .and_then(WireId::into_user)
            .ok_or(ProtocolError::MissingField("user_id"))?;
        let display_name = first_non_empty([self.nickname, self.username])
            .unwrap_or_else(|| identity.to_string());
        Ok(SelfProfile {
            identity,
            display_name,
            avatar_ref: first_non_empty([self.avatar_url, self.avatar]),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireFriend {
    #[serde(default)]
    pub friend_id: Option<WireId>,
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub last_interact_at: Option<WireTimestamp>,
}

impl WireFriend {
    pub fn normalize(self) -> Result<ConversationSummary, ProtocolError> {
        let counterpart = self
            .friend_id
            .or(self.id)
            .and_then(WireId::into_user)
            .ok_or(ProtocolError::MissingField("friend_id"))?;
        let display_name = first_non_empty([self.display_name, self.nickname, self.username])
            .unwrap_or_else(|| counterpart.to_string());
        Ok(ConversationSummary {
            counterpart,
            display_name,
            avatar_ref: first_non_empty([self.avatar_url, self.avatar]),
            last_activity_at: self
                .last_interact_at
                .as_ref()
                .and_then(WireTimestamp::parse_meaningful),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireUploadData {
    pub url: String,
}

/// Upload response: the current enveloped form or the older bare `{url}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireUpload {
    Bare(WireUploadData),
    Enveloped(Envelope<WireUploadData>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUnreadCounts {
    #[serde(default)]
    pub counts: HashMap<String, i64>,
}

impl WireUnreadCounts {
    /// Drops entries that are not valid counters; sorted for determinism.
    pub fn normalize(self) -> Vec<(UserId, u32)> {
        let mut counts: Vec<(UserId, u32)> = self
            .counts
            .into_iter()
            .filter_map(|(id, n)| {
                let id = id.trim().to_string();
                let n = u32::try_from(n).ok()?;
                (!id.is_empty()).then(|| (UserId(id), n))
            })
            .collect();
        counts.sort();
        counts
    }
}

/// Body of a message submission. `to` is sent as a string, as the server expects.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitBody<'a> {
    pub to: &'a str,
    pub content: &'a str,
    #[serde(flatten)]
    pub extra: Option<SubmitExtra>,
}

/// Kind-specific fields the image and file routes expect.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SubmitExtra {
    Image { width: u32, height: u32 },
    File {
        name: String,
        size: u64,
        #[serde(rename = "type")]
        mime: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(me: &'a UserId, counterpart: Option<&'a UserId>) -> NormalizeContext<'a> {
        NormalizeContext {
            self_id: me,
            counterpart,
            received_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_new_message_event_with_numeric_ids() {
        let me = UserId::from("1");
        let frame = json!({
            "type": "new_message",
            "data": {"id": 77, "from": 2, "to": "1", "content": "hi", "type": 1,
                     "created_at": "2024-05-04T10:00:00Z"}
        })
        .to_string();

        let event = decode_event(&frame, &me, Utc::now()).unwrap();
        let InboundEvent::NewMessage(msg) = event else {
            panic!("expected a message");
        };
        assert_eq!(msg.id, MessageId::Confirmed("77".into()));
        assert_eq!(msg.sender, UserId::from("2"));
        assert_eq!(msg.recipient, me);
        assert!(!msg.is_from(&me));
        assert_eq!(msg.kind, ContentKind::Text);
    }

    #[test]
    fn test_sender_alias_and_file_url() {
        let me = UserId::from("1");
        let wire: WireMessage = serde_json::from_value(json!({
            "id": "m9", "sender": "5", "content": "", "file_url": "/static/upload/a.png",
            "type": 2, "created_at": 1_700_000_100
        }))
        .unwrap();
        let msg = wire.normalize(&ctx(&me, None)).unwrap();
        assert_eq!(msg.sender, UserId::from("5"));
        assert_eq!(msg.recipient, me);
        assert_eq!(msg.content, "/static/upload/a.png");
        assert_eq!(msg.kind, ContentKind::Image);
        assert_eq!(msg.created_at.timestamp(), 1_700_000_100);
    }

    #[test]
    fn test_identities_beat_direct_flag() {
        let me = UserId::from("1");
        let friend = UserId::from("2");
        // direct says "from self" but the identities say otherwise
        let wire: WireMessage = serde_json::from_value(json!({
            "from": "2", "to": "1", "direct": 1, "content": "yo"
        }))
        .unwrap();
        let msg = wire.normalize(&ctx(&me, Some(&friend))).unwrap();
        assert!(!msg.is_from(&me));
    }

    #[test]
    fn test_direct_flag_when_identities_missing() {
        let me = UserId::from("1");
        let friend = UserId::from("2");
        let mine: WireMessage =
            serde_json::from_value(json!({"direct": 1, "content": "a"})).unwrap();
        let theirs: WireMessage =
            serde_json::from_value(json!({"direct": 2, "content": "b"})).unwrap();

        let mine = mine.normalize(&ctx(&me, Some(&friend))).unwrap();
        let theirs = theirs.normalize(&ctx(&me, Some(&friend))).unwrap();
        assert!(mine.is_from(&me));
        assert_eq!(mine.recipient, friend);
        assert!(!theirs.is_from(&me));

        let orphan: WireMessage =
            serde_json::from_value(json!({"direct": 2, "content": "b"})).unwrap();
        assert_eq!(
            orphan.normalize(&ctx(&me, None)),
            Err(ProtocolError::MissingField("from"))
        );
    }

    #[test]
    fn test_missing_id_gets_stable_fingerprint() {
        let me = UserId::from("1");
        let payload = json!({"from": "2", "to": "1", "content": "same", "created_at": 1_700_000_000});
        let a: WireMessage = serde_json::from_value(payload.clone()).unwrap();
        let b: WireMessage = serde_json::from_value(payload).unwrap();
        let a = a.normalize(&ctx(&me, None)).unwrap();
        let b = b.normalize(&ctx(&me, None)).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.id.as_confirmed().unwrap().starts_with(FINGERPRINT_ID_PREFIX));
    }

    #[test]
    fn test_zero_id_is_treated_as_missing() {
        // Live frames carry the server's unset integer key.
        let me = UserId::from("1");
        let first = json!({
            "type": "new_message",
            "data": {"id": 0, "from": 2, "to": 1, "content": "one", "type": 1,
                     "created_at": "2024-05-04T10:00:00.123456+08:00"}
        });
        let second = json!({
            "type": "new_message",
            "data": {"id": 0, "from": 2, "to": 1, "content": "two", "type": 1,
                     "created_at": "2024-05-04T10:00:07.5+08:00"}
        });

        let decode = |frame: serde_json::Value| match decode_event(&frame.to_string(), &me, Utc::now()) {
            Ok(InboundEvent::NewMessage(msg)) => msg,
            other => panic!("expected a message, got {other:?}"),
        };
        let first = decode(first);
        let second = decode(second);

        assert_ne!(first.id, second.id);
        for msg in [&first, &second] {
            assert!(msg.id.as_confirmed().unwrap().starts_with(FINGERPRINT_ID_PREFIX));
        }

        let empty: WireMessage =
            serde_json::from_value(json!({"id": " ", "from": "2", "to": "1", "content": "x"})).unwrap();
        let empty = empty.normalize(&ctx(&me, None)).unwrap();
        assert!(empty.id.as_confirmed().unwrap().starts_with(FINGERPRINT_ID_PREFIX));
    }

    #[test]
    fn test_attachment_send_and_history_share_an_id() {
        let me = UserId::from("1");
        let friend = UserId::from("2");
        // Reply to POST /messages/image.
        let sent: WireMessage = serde_json::from_value(json!({
            "from": 1, "to": 2, "content": "/static/upload/1_cat.png", "type": 2,
            "created_at": 1_714_788_000
        }))
        .unwrap();
        // The same row from GET /messages, which has no `type`.
        let history: WireHistory = serde_json::from_value(json!({
            "messages": [{
                "from": 1, "to": 2, "direct": 1, "content": "/static/upload/1_cat.png",
                "created_at": "2024-05-04T10:00:00.654321+08:00", "avatar_url": "", "hide_time": false
            }]
        }))
        .unwrap();

        let sent = sent.normalize(&ctx(&me, Some(&friend))).unwrap();
        let stored = history
            .into_messages()
            .pop()
            .unwrap()
            .normalize(&ctx(&me, Some(&friend)))
            .unwrap();

        assert_eq!(sent.kind, ContentKind::Image);
        assert_eq!(stored.kind, ContentKind::Text);
        assert_eq!(sent.id, stored.id);
    }

    #[test]
    fn test_unread_update_event() {
        let me = UserId::from("1");
        let frame = json!({"type": "unread_update", "data": {"friend_id": 3, "count": 2}});
        let event = decode_event(&frame.to_string(), &me, Utc::now()).unwrap();
        assert_eq!(
            event,
            InboundEvent::UnreadDelta {
                counterpart: UserId::from("3"),
                delta: 2
            }
        );

        let default_delta = json!({"type": "unread_update", "data": {"sender": "3"}});
        let event = decode_event(&default_delta.to_string(), &me, Utc::now()).unwrap();
        assert!(matches!(event, InboundEvent::UnreadDelta { delta: 1, .. }));
    }

    #[test]
    fn test_malformed_events_are_rejected() {
        let me = UserId::from("1");
        assert!(matches!(
            decode_event("not json", &me, Utc::now()),
            Err(ProtocolError::Json(_))
        ));
        assert_eq!(
            decode_event(r#"{"type":"typing","data":{}}"#, &me, Utc::now()),
            Err(ProtocolError::UnknownEvent("typing".into()))
        );
        assert!(decode_event(
            r#"{"type":"unread_update","data":{"friend_id":"3","count":-4}}"#,
            &me,
            Utc::now()
        )
        .is_err());
        assert!(decode_event(
            r#"{"type":"new_message","data":{"from":"2","to":"1","content":"x","type":7}}"#,
            &me,
            Utc::now()
        )
        .is_err());
    }

    #[test]
    fn test_history_shapes() {
        let bare: WireHistory = serde_json::from_value(json!([{"content": "a"}])).unwrap();
        let wrapped: WireHistory =
            serde_json::from_value(json!({"messages": [{"content": "a"}, {"content": "b"}]}))
                .unwrap();
        let nested: WireHistory =
            serde_json::from_value(json!({"data": {"messages": [{"content": "a"}]}})).unwrap();
        let null: WireHistory = serde_json::from_value(json!({"messages": null})).unwrap();

        assert_eq!(bare.into_messages().len(), 1);
        assert_eq!(wrapped.into_messages().len(), 2);
        assert_eq!(nested.into_messages().len(), 1);
        assert!(null.into_messages().is_empty());
    }

    #[test]
    fn test_friend_and_self_shapes() {
        let friend: WireFriend = serde_json::from_value(json!({
            "friend_id": "9", "display_name": "", "nickname": "Nine",
            "last_interact_at": "0001-01-01T00:00:00Z"
        }))
        .unwrap();
        let friend = friend.normalize().unwrap();
        assert_eq!(friend.counterpart, UserId::from("9"));
        assert_eq!(friend.display_name, "Nine");
        assert_eq!(friend.avatar_ref, None);
        assert_eq!(friend.last_activity_at, None);

        let me: WireSelf = serde_json::from_value(json!({
            "user_id": "1", "username": "alice", "avatar": "/a.png"
        }))
        .unwrap();
        let me = me.normalize().unwrap();
        assert_eq!(me.identity, UserId::from("1"));
        assert_eq!(me.display_name, "alice");
        assert_eq!(me.avatar_ref.as_deref(), Some("/a.png"));
    }

    #[test]
    fn test_upload_shapes() {
        let bare: WireUpload = serde_json::from_value(json!({"url": "/u/1.png"})).unwrap();
        let enveloped: WireUpload = serde_json::from_value(
            json!({"code": 1000, "msg": "success", "data": {"url": "/u/2.png"}}),
        )
        .unwrap();
        assert!(matches!(bare, WireUpload::Bare(d) if d.url == "/u/1.png"));
        assert!(matches!(enveloped, WireUpload::Enveloped(e) if e.data.as_ref().unwrap().url == "/u/2.png"));
    }

    #[test]
    fn test_unread_counts_normalize() {
        let counts: WireUnreadCounts =
            serde_json::from_value(json!({"counts": {"2": 3, "5": 0, "7": -1}})).unwrap();
        assert_eq!(
            counts.normalize(),
            vec![(UserId::from("2"), 3), (UserId::from("5"), 0)]
        );
    }

    #[test]
    fn test_submit_body_shapes() {
        let text = serde_json::to_value(SubmitBody {
            to: "2",
            content: "hi",
            extra: None,
        })
        .unwrap();
        assert_eq!(text, json!({"to": "2", "content": "hi"}));

        let image = serde_json::to_value(SubmitBody {
            to: "2",
            content: "/u.png",
            extra: Some(SubmitExtra::Image { width: 0, height: 0 }),
        })
        .unwrap();
        assert_eq!(image["width"], json!(0));
    }
}
