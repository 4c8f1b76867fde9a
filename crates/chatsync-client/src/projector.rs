//! Pure mapping from stored conversations to renderable rows.
//!
//! Nothing here touches the network or the clock: `now` is passed in so the
//! same inputs always produce the same output.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use uuid::Uuid;

use chatsync_shared::constants::{DEFAULT_AVATAR_URL, DEFAULT_GROUPING_GAP_SECS};
use chatsync_shared::types::{ContentKind, UserId};
use chatsync_store::{ConversationStore, Delivery, MessageEntry};

#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Consecutive messages closer than this hide the second timestamp.
    pub grouping_gap: chrono::Duration,
    pub default_avatar: String,
    pub utc_offset: FixedOffset,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            grouping_gap: chrono::Duration::seconds(DEFAULT_GROUPING_GAP_SECS),
            default_avatar: DEFAULT_AVATAR_URL.to_string(),
            utc_offset: Utc.fix(),
        }
    }
}

/// Who is looking at the conversation.
#[derive(Debug, Clone, Copy)]
pub struct ViewerContext<'a> {
    pub self_id: &'a UserId,
    pub self_avatar: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    SelfSent,
    Counterpart,
}

/// Opaque reference to a failed placeholder, used to retry or discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RetryHandle(Uuid);

impl RetryHandle {
    pub(crate) fn new(placeholder: Uuid) -> Self {
        Self(placeholder)
    }

    pub(crate) fn placeholder(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RetryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The simple form is what the console asks users to type back.
        write!(f, "{}", self.0.simple())
    }
}

impl std::str::FromStr for RetryHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    pub direction: Direction,
    pub suppress_timestamp: bool,
    pub avatar: String,
    pub content: String,
    pub kind: ContentKind,
    pub delivery: Delivery,
    /// `None` while the message is still a local placeholder.
    pub server_id: Option<String>,
    /// Present only on failed placeholders.
    pub retry: Option<RetryHandle>,
    pub time_label: String,
    pub created_at: DateTime<Utc>,
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRow {
    pub counterpart: UserId,
    pub title: String,
    pub avatar: String,
    pub unread: u32,
    pub preview: String,
    pub time_label: Option<String>,
    pub focused: bool,
}

pub fn project(
    entries: &[MessageEntry],
    viewer: ViewerContext<'_>,
    config: &ProjectorConfig,
    now: DateTime<Utc>,
) -> Vec<DisplayRecord> {
    let mut previous: Option<DateTime<Utc>> = None;
    entries
        .iter()
        .map(|entry| {
            let message = &entry.message;
            let suppress_timestamp =
                previous.map_or(false, |prev| message.created_at - prev < config.grouping_gap);
            previous = Some(message.created_at);

            let is_self = message.is_from(viewer.self_id);
            let (direction, avatar) = if is_self {
                (Direction::SelfSent, viewer.self_avatar)
            } else {
                (Direction::Counterpart, message.sender_avatar.as_deref())
            };

            DisplayRecord {
                direction,
                suppress_timestamp,
                avatar: resolve_avatar(avatar, config),
                content: message.content.clone(),
                kind: message.kind,
                delivery: entry.delivery.clone(),
                server_id: message.id.as_confirmed().map(str::to_string),
                retry: match (&entry.delivery, message.id.as_placeholder()) {
                    (Delivery::Failed { .. }, Some(local)) => Some(RetryHandle::new(local)),
                    _ => None,
                },
                time_label: time_label(message.created_at, now, config.utc_offset),
                created_at: message.created_at,
            }
        })
        .collect()
}

/// Conversation list, most recent activity first.
pub fn project_conversation_list(
    store: &ConversationStore,
    focused: Option<&UserId>,
    config: &ProjectorConfig,
    now: DateTime<Utc>,
) -> Vec<ConversationRow> {
    let mut convs: Vec<_> = store.iter().collect();
    convs.sort_by(|a, b| {
        let at = |c: &chatsync_store::Conversation| c.last_activity().map(|l| l.at);
        at(b).cmp(&at(a)).then_with(|| a.title().cmp(b.title()))
    });

    convs
        .into_iter()
        .map(|conv| ConversationRow {
            counterpart: conv.counterpart.clone(),
            title: conv.title().to_string(),
            avatar: resolve_avatar(conv.avatar_ref.as_deref(), config),
            unread: conv.unread(),
            preview: conv
                .last_activity()
                .map(|l| l.preview.clone())
                .unwrap_or_default(),
            time_label: conv
                .last_activity()
                .map(|l| time_label(l.at, now, config.utc_offset)),
            focused: focused == Some(&conv.counterpart),
        })
        .collect()
}

fn resolve_avatar(avatar: Option<&str>, config: &ProjectorConfig) -> String {
    avatar
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(&config.default_avatar)
        .to_string()
}

/// `HH:MM` today, `Yesterday HH:MM`, otherwise `MM-DD HH:MM`.
pub fn time_label(at: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> String {
    let local = at.with_timezone(&offset);
    let today = now.with_timezone(&offset).date_naive();
    let day = local.date_naive();

    if day == today {
        local.format("%H:%M").to_string()
    } else if today.pred_opt() == Some(day) {
        local.format("Yesterday %H:%M").to_string()
    } else {
        local.format("%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_shared::models::Message;
    use chatsync_shared::types::MessageId;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn entry(id: &str, from: &str, created_at: DateTime<Utc>) -> MessageEntry {
        MessageEntry::new(Message {
            id: MessageId::Confirmed(id.into()),
            sender: UserId::from(from),
            recipient: UserId::from(if from == "me" { "bob" } else { "me" }),
            content: format!("msg {id}"),
            kind: ContentKind::Text,
            created_at,
            sender_avatar: None,
        })
    }

    fn viewer<'a>(me: &'a UserId, avatar: Option<&'a str>) -> ViewerContext<'a> {
        ViewerContext {
            self_id: me,
            self_avatar: avatar,
        }
    }

    #[test]
    fn test_grouping_gap_is_strict() {
        let me = UserId::from("me");
        let entries = vec![
            entry("1", "bob", at(10, 0)),
            entry("2", "bob", at(10, 4)),
            entry("3", "me", at(10, 10)),
            entry("4", "me", at(10, 15)),
        ];
        let records = project(&entries, viewer(&me, None), &ProjectorConfig::default(), at(12, 0));
        let suppressed: Vec<bool> = records.iter().map(|r| r.suppress_timestamp).collect();
        // 4 min gap hides, 6 min shows, exactly 5 min shows.
        assert_eq!(suppressed, vec![false, true, false, false]);
    }

    #[test]
    fn test_direction_from_identity() {
        let me = UserId::from("me");
        let entries = vec![entry("1", "bob", at(9, 0)), entry("2", "me", at(9, 1))];
        let records = project(&entries, viewer(&me, None), &ProjectorConfig::default(), at(12, 0));
        assert_eq!(records[0].direction, Direction::Counterpart);
        assert_eq!(records[1].direction, Direction::SelfSent);
    }

    #[test]
    fn test_avatar_resolution() {
        let me = UserId::from("me");
        let mut from_bob = entry("1", "bob", at(9, 0));
        from_bob.message.sender_avatar = Some("/a/bob.png".into());
        let mut from_me = entry("2", "me", at(9, 1));
        // Self messages ignore whatever avatar the payload carried.
        from_me.message.sender_avatar = Some("/a/stale.png".into());
        let bare = entry("3", "bob", at(9, 2));
        let entries = vec![from_bob, from_me, bare];

        let config = ProjectorConfig::default();
        let records = project(&entries, viewer(&me, Some("/a/me.png")), &config, at(12, 0));
        assert_eq!(records[0].avatar, "/a/bob.png");
        assert_eq!(records[1].avatar, "/a/me.png");
        assert_eq!(records[2].avatar, config.default_avatar);

        let records = project(&entries, viewer(&me, None), &config, at(12, 0));
        assert_eq!(records[1].avatar, config.default_avatar);
    }

    #[test]
    fn test_placeholders_have_no_server_id() {
        let me = UserId::from("me");
        let local = Uuid::new_v4();
        let mut pending = entry("x", "me", at(9, 0));
        pending.message.id = MessageId::Placeholder(local);
        let mut failed = MessageEntry::new(pending.message.clone());
        failed.delivery = Delivery::Failed {
            reason: "offline".into(),
            retryable: true,
        };
        let pending = MessageEntry::new(pending.message);

        let records = project(
            &[pending, failed],
            viewer(&me, None),
            &ProjectorConfig::default(),
            at(12, 0),
        );
        assert!(records.iter().all(|r| r.server_id.is_none()));
        assert_eq!(records[0].retry, None);
        assert_eq!(records[1].retry, Some(RetryHandle::new(local)));
    }

    #[test]
    fn test_time_labels() {
        let utc = Utc.fix();
        let now = at(12, 0);
        assert_eq!(time_label(at(8, 5), now, utc), "08:05");
        assert_eq!(
            time_label(Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap(), now, utc),
            "Yesterday 23:59"
        );
        assert_eq!(
            time_label(Utc.with_ymd_and_hms(2024, 2, 28, 7, 30, 0).unwrap(), now, utc),
            "02-28 07:30"
        );

        // 23:30 UTC on the 9th is already the 10th at UTC+8.
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(
            time_label(Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap(), now, plus8),
            "07:30"
        );
    }

    #[test]
    fn test_conversation_list_order() {
        let mut store = ConversationStore::new();
        let bob = UserId::from("bob");
        let carol = UserId::from("carol");
        store.append_message(&bob, entry("1", "bob", at(9, 0)).message);
        store.append_message(&carol, entry("2", "carol", at(11, 0)).message);
        store.ensure(&UserId::from("dave"));
        store.set_unread(&bob, 3);

        let rows = project_conversation_list(&store, Some(&carol), &ProjectorConfig::default(), at(12, 0));
        let order: Vec<&str> = rows.iter().map(|r| r.counterpart.as_str()).collect();
        assert_eq!(order, vec!["carol", "bob", "dave"]);
        assert!(rows[0].focused);
        assert_eq!(rows[1].unread, 3);
        assert_eq!(rows[1].preview, "msg 1");
        assert_eq!(rows[1].time_label.as_deref(), Some("09:00"));
        assert_eq!(rows[2].time_label, None);
    }
}
