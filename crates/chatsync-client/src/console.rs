//! Line-oriented terminal front-end.
//!
//! Plain lines are sent as text to the focused conversation; lines starting
//! with `/` are commands (see [`HELP`]).

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use chatsync_shared::types::{ContentKind, UserId};
use chatsync_store::Delivery;

use crate::events::ViewUpdate;
use crate::projector::{Direction, DisplayRecord, RetryHandle};
use crate::runtime::ChatRuntime;
use crate::synchronizer::UiIntent;

pub const HELP: &str = "\
/focus <user-id>     open a conversation
/image <path>        upload and send an image
/file <path>         upload and send a file
/retry <handle>      resend a failed message
/discard <handle>    drop a failed message
/history             load the full history
/avatar [url]        change (or clear) your avatar
/quit                leave";

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Intent(UiIntent),
    Attach { path: PathBuf, kind: ContentKind },
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<ConsoleCommand, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(ConsoleCommand::Intent(UiIntent::Send {
            content: line.to_string(),
            kind: ContentKind::Text,
        })));
    };

    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (rest, ""),
    };
    let needs_arg = |what: &str| format!("/{cmd} needs {what}");

    let parsed = match cmd {
        "focus" if !arg.is_empty() => ConsoleCommand::Intent(UiIntent::Focus(UserId::from(arg))),
        "focus" => return Some(Err(needs_arg("a user id"))),
        "image" | "file" if arg.is_empty() => return Some(Err(needs_arg("a path"))),
        "image" => ConsoleCommand::Attach {
            path: PathBuf::from(arg),
            kind: ContentKind::Image,
        },
        "file" => ConsoleCommand::Attach {
            path: PathBuf::from(arg),
            kind: ContentKind::File,
        },
        "retry" | "discard" => match arg.parse::<RetryHandle>() {
            Ok(handle) if cmd == "retry" => ConsoleCommand::Intent(UiIntent::Retry(handle)),
            Ok(handle) => ConsoleCommand::Intent(UiIntent::Discard(handle)),
            Err(_) => return Some(Err(needs_arg("a handle shown next to a failed message"))),
        },
        "history" => ConsoleCommand::Intent(UiIntent::LoadFullHistory),
        "avatar" => ConsoleCommand::Intent(UiIntent::AvatarChanged(
            (!arg.is_empty()).then(|| arg.to_string()),
        )),
        "help" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Some(Err(format!("unknown command /{other}, try /help"))),
    };
    Some(Ok(parsed))
}

/// Run the console until `/quit`, end of input, or the session ends.
pub async fn run_console(mut runtime: ChatRuntime) -> anyhow::Result<()> {
    let intents = runtime.intents();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    None => {}
                    Some(Err(msg)) => println!("! {msg}"),
                    Some(Ok(ConsoleCommand::Quit)) => break,
                    Some(Ok(ConsoleCommand::Help)) => println!("{HELP}"),
                    Some(Ok(ConsoleCommand::Intent(intent))) => {
                        if intents.send(intent).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(ConsoleCommand::Attach { path, kind })) => match read_attachment(&path).await {
                        Ok((bytes, file_name)) => {
                            let intent = UiIntent::SendAttachment { bytes, file_name, kind };
                            if intents.send(intent).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => println!("! {e}"),
                    },
                }
            }
            update = runtime.next_update() => match update {
                Some(update) => render(&update),
                None => break,
            },
        }
    }

    runtime.shutdown().await;
    Ok(())
}

async fn read_attachment(path: &Path) -> anyhow::Result<(Bytes, String)> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok((Bytes::from(data), file_name))
}

fn render(update: &ViewUpdate) {
    match update {
        ViewUpdate::ConnectionChanged(state) => println!("-- {state}"),
        ViewUpdate::UnreadChanged { counterpart, count } if *count > 0 => {
            println!("-- {counterpart}: {count} unread")
        }
        ViewUpdate::UnreadChanged { .. } => {}
        ViewUpdate::MessagesChanged { counterpart, records } => {
            println!("==== {counterpart} ====");
            for record in records {
                for line in format_record(record) {
                    println!("{line}");
                }
            }
        }
        ViewUpdate::ConversationList(rows) => {
            for row in rows {
                let marker = if row.focused { '>' } else { ' ' };
                let unread = if row.unread > 0 {
                    format!(" ({})", row.unread)
                } else {
                    String::new()
                };
                println!(
                    "{marker} {} [{}]{unread} {} {}",
                    row.title,
                    row.counterpart,
                    row.time_label.as_deref().unwrap_or(""),
                    row.preview
                );
            }
        }
        ViewUpdate::SendFailed { error, handle, .. } => {
            println!("! send failed: {error} (/retry {handle} or /discard {handle})")
        }
        ViewUpdate::Notice(msg) => println!("! {msg}"),
        ViewUpdate::ReauthRequired(msg) => {
            warn!(reason = %msg, "Credential rejected");
            println!("! session expired, set CHATSYNC_TOKEN and restart ({msg})");
        }
    }
}

fn format_record(record: &DisplayRecord) -> Vec<String> {
    let mut out = Vec::with_capacity(2);
    if !record.suppress_timestamp {
        out.push(format!("        {}", record.time_label));
    }
    let arrow = match record.direction {
        Direction::SelfSent => ">>",
        Direction::Counterpart => "<<",
    };
    let body = match record.kind {
        ContentKind::Text => record.content.clone(),
        other => format!("[{}] {}", other.label(), record.content),
    };
    let status = match (&record.delivery, record.retry) {
        (Delivery::Pending, _) => " (sending)".to_string(),
        (Delivery::Failed { reason, .. }, Some(handle)) => format!(" (failed: {reason}; {handle})"),
        (Delivery::Failed { reason, .. }, None) => format!(" (failed: {reason})"),
        (Delivery::Confirmed, _) => String::new(),
    };
    out.push(format!("{arrow} {body}{status}"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn parsed(line: &str) -> ConsoleCommand {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(
            parsed("  hello there "),
            ConsoleCommand::Intent(UiIntent::Send {
                content: "hello there".into(),
                kind: ContentKind::Text,
            })
        );
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            parsed("/focus 42"),
            ConsoleCommand::Intent(UiIntent::Focus(UserId::from("42")))
        );
        assert_eq!(
            parsed("/image ./cat.png"),
            ConsoleCommand::Attach {
                path: PathBuf::from("./cat.png"),
                kind: ContentKind::Image,
            }
        );
        assert_eq!(parsed("/history"), ConsoleCommand::Intent(UiIntent::LoadFullHistory));
        assert_eq!(parsed("/avatar"), ConsoleCommand::Intent(UiIntent::AvatarChanged(None)));
        assert_eq!(parsed("/quit"), ConsoleCommand::Quit);

        let local = Uuid::new_v4();
        let handle: RetryHandle = local.simple().to_string().parse().unwrap();
        assert_eq!(
            parsed(&format!("/retry {handle}")),
            ConsoleCommand::Intent(UiIntent::Retry(handle))
        );
    }

    #[test]
    fn test_bad_commands() {
        assert!(parse_line("/focus").unwrap().is_err());
        assert!(parse_line("/file").unwrap().is_err());
        assert!(parse_line("/retry not-a-handle").unwrap().is_err());
        assert!(parse_line("/dance").unwrap().is_err());
    }

    #[test]
    fn test_format_record() {
        let record = DisplayRecord {
            direction: Direction::SelfSent,
            suppress_timestamp: true,
            avatar: "/a.png".into(),
            content: "/static/upload/x.png".into(),
            kind: ContentKind::Image,
            delivery: Delivery::Pending,
            server_id: None,
            retry: None,
            time_label: "10:00".into(),
            created_at: Utc::now(),
        };
        assert_eq!(format_record(&record), vec![">> [image] /static/upload/x.png (sending)"]);
    }
}
