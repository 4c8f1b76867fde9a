//! REST collaborator interface.
//!
//! [`ChatApi`] is the seam the synchronizer calls through; [`HttpApi`]
//! implements it against the chat server's `/api/v1` routes. Every payload
//! is normalized into canonical types before it leaves this module.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use chatsync_shared::constants::CODE_SUCCESS;
use chatsync_shared::error::{Result, SyncError};
use chatsync_shared::models::{ConversationSummary, Message, SelfProfile};
use chatsync_shared::protocol::{
    Envelope, NormalizeContext, SubmitBody, SubmitExtra, WireFriend, WireHistory, WireMessage,
    WireSelf, WireUnreadCounts, WireUpload,
};
use chatsync_shared::types::{ContentKind, UserId};

/// Flags for a history request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ask the server to mark the conversation read.
    pub mark_read: bool,
    /// Full history instead of the recent window.
    pub history: bool,
}

/// Operations the core consumes from the chat server.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn resolve_self(&self) -> Result<SelfProfile>;

    async fn list_conversation_summaries(&self) -> Result<Vec<ConversationSummary>>;

    async fn fetch_messages(
        &self,
        self_id: &UserId,
        counterpart: &UserId,
        options: FetchOptions,
    ) -> Result<Vec<Message>>;

    async fn submit_message(
        &self,
        self_id: &UserId,
        counterpart: &UserId,
        kind: ContentKind,
        content: &str,
    ) -> Result<Message>;

    /// Upload raw bytes, returning the URL to send as message content.
    async fn upload_attachment(&self, bytes: Bytes, file_name: &str) -> Result<String>;

    async fn fetch_unread_counts(&self) -> Result<Vec<(UserId, u32)>>;
}

/// `reqwest` implementation of [`ChatApi`].
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    credential: String,
}

impl HttpApi {
    pub fn new(base_url: &str, credential: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("HTTP client init: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential: credential.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.credential)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Option<T>> {
        let resp = self
            .client
            .get(self.url(path))
            .header(AUTHORIZATION, self.bearer())
            .query(query)
            .send()
            .await
            .map_err(request_error)?;
        read_envelope(resp).await
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn resolve_self(&self) -> Result<SelfProfile> {
        let wire: WireSelf = self
            .get("/user/info", &[])
            .await?
            .ok_or_else(|| SyncError::DataIntegrity("empty user info".into()))?;
        Ok(wire.normalize()?)
    }

    async fn list_conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let friends: Vec<WireFriend> = self.get("/friends", &[]).await?.unwrap_or_default();
        let mut summaries = Vec::with_capacity(friends.len());
        for friend in friends {
            match friend.normalize() {
                Ok(s) => summaries.push(s),
                Err(e) => warn!(error = %e, "Skipping malformed friend entry"),
            }
        }
        Ok(summaries)
    }

    async fn fetch_messages(
        &self,
        self_id: &UserId,
        counterpart: &UserId,
        options: FetchOptions,
    ) -> Result<Vec<Message>> {
        let query = [
            ("friend_id", counterpart.to_string()),
            ("mark_read", options.mark_read.to_string()),
            ("history", options.history.to_string()),
        ];
        let history: Option<WireHistory> = self.get("/messages", &query).await?;

        let ctx = NormalizeContext {
            self_id,
            counterpart: Some(counterpart),
            received_at: Utc::now(),
        };
        let mut messages = Vec::new();
        for wire in history.map(WireHistory::into_messages).unwrap_or_default() {
            match wire.normalize(&ctx) {
                Ok(m) => messages.push(m),
                Err(e) => warn!(counterpart = %counterpart, error = %e, "Dropping malformed history entry"),
            }
        }
        debug!(counterpart = %counterpart, count = messages.len(), "History fetched");
        Ok(messages)
    }

    async fn submit_message(
        &self,
        self_id: &UserId,
        counterpart: &UserId,
        kind: ContentKind,
        content: &str,
    ) -> Result<Message> {
        let body = SubmitBody {
            to: counterpart.as_str(),
            content,
            extra: submit_extra(kind, content),
        };
        let resp = self
            .client
            .post(self.url(submit_path(kind)))
            .header(AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let wire: WireMessage = read_envelope(resp)
            .await?
            .ok_or_else(|| SyncError::DataIntegrity("empty send confirmation".into()))?;
        let ctx = NormalizeContext {
            self_id,
            counterpart: Some(counterpart),
            received_at: Utc::now(),
        };
        Ok(wire.normalize(&ctx)?)
    }

    async fn upload_attachment(&self, bytes: Bytes, file_name: &str) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(self.url("/upload"))
            .header(AUTHORIZATION, self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(request_error)?;
        match serde_json::from_str::<WireUpload>(&body) {
            Ok(WireUpload::Bare(data)) => Ok(data.url),
            Ok(WireUpload::Enveloped(envelope)) => unwrap_envelope(envelope)?
                .map(|d| d.url)
                .ok_or_else(|| SyncError::DataIntegrity("upload succeeded without a URL".into())),
            Err(e) => Err(undecodable(status, &body, e)),
        }
    }

    async fn fetch_unread_counts(&self) -> Result<Vec<(UserId, u32)>> {
        let counts: Option<WireUnreadCounts> = self.get("/messages/unread", &[]).await?;
        Ok(counts.map(WireUnreadCounts::normalize).unwrap_or_default())
    }
}

/// Route for each content kind.
fn submit_path(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Text => "/messages",
        ContentKind::Image => "/messages/image",
        ContentKind::File => "/messages/file",
    }
}

fn submit_extra(kind: ContentKind, content: &str) -> Option<SubmitExtra> {
    match kind {
        ContentKind::Text => None,
        ContentKind::Image => Some(SubmitExtra::Image { width: 0, height: 0 }),
        ContentKind::File => Some(SubmitExtra::File {
            name: file_name_from_url(content),
            size: 0,
            mime: String::new(),
        }),
    }
}

fn file_name_from_url(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string()
}

async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(request_error)?;
    decode_envelope(status, &body)
}

/// Decode `{code, msg, data}` and map failures onto the taxonomy.
fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<Option<T>> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(envelope) => unwrap_envelope(envelope),
        Err(e) => Err(undecodable(status, body, e)),
    }
}

fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<Option<T>> {
    if envelope.code == CODE_SUCCESS {
        Ok(envelope.data)
    } else {
        Err(SyncError::from_code(envelope.code, &envelope.msg))
    }
}

fn undecodable(status: u16, body: &str, e: serde_json::Error) -> SyncError {
    if (200..300).contains(&status) {
        SyncError::DataIntegrity(format!("undecodable response: {e}"))
    } else {
        let snippet: String = body.chars().take(200).collect();
        SyncError::from_status(status, &snippet)
    }
}

fn request_error(e: reqwest::Error) -> SyncError {
    if e.is_decode() {
        SyncError::DataIntegrity(e.to_string())
    } else if let Some(status) = e.status() {
        SyncError::from_status(status.as_u16(), "")
    } else {
        SyncError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_shared::protocol::WireUploadData;

    #[test]
    fn test_success_envelope() {
        let data: Option<WireUnreadCounts> =
            decode_envelope(200, r#"{"code":1000,"msg":"success","data":{"counts":{"2":1}}}"#)
                .unwrap();
        assert_eq!(data.unwrap().normalize(), vec![(UserId::from("2"), 1)]);
    }

    #[test]
    fn test_null_data_is_none() {
        let data: Option<Vec<WireFriend>> =
            decode_envelope(200, r#"{"code":1000,"msg":"success","data":null}"#).unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn test_error_codes_map_to_taxonomy() {
        let auth = decode_envelope::<WireSelf>(200, r#"{"code":1014,"msg":"expired"}"#);
        assert!(matches!(auth, Err(SyncError::Auth(_))));

        let validation = decode_envelope::<WireSelf>(200, r#"{"code":1009,"msg":"not friend"}"#);
        assert!(matches!(validation, Err(SyncError::Validation(_))));

        let server = decode_envelope::<WireSelf>(200, r#"{"code":1015,"msg":"send failed"}"#);
        assert!(matches!(server, Err(SyncError::Server(_))));
    }

    #[test]
    fn test_undecodable_bodies() {
        let gateway = decode_envelope::<WireSelf>(502, "<html>bad gateway</html>");
        assert!(matches!(gateway, Err(SyncError::Server(_))));

        let unauthorized = decode_envelope::<WireSelf>(401, "");
        assert!(matches!(unauthorized, Err(SyncError::Auth(_))));

        let garbage = decode_envelope::<WireSelf>(200, "{{{");
        assert!(matches!(garbage, Err(SyncError::DataIntegrity(_))));
    }

    #[test]
    fn test_upload_envelope_failure() {
        let envelope = Envelope::<WireUploadData> {
            code: 1001,
            msg: "too large".into(),
            data: None,
        };
        assert!(matches!(unwrap_envelope(envelope), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_routes_and_extras() {
        assert_eq!(submit_path(ContentKind::Text), "/messages");
        assert_eq!(submit_path(ContentKind::Image), "/messages/image");
        assert_eq!(submit_path(ContentKind::File), "/messages/file");
        assert!(submit_extra(ContentKind::Text, "hi").is_none());
        assert!(matches!(
            submit_extra(ContentKind::File, "/static/upload/2024/report.pdf"),
            Some(SubmitExtra::File { name, .. }) if name == "report.pdf"
        ));
    }

    #[test]
    fn test_http_api_trims_base_url() {
        let api = HttpApi::new("http://localhost:8080/api/v1/", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("/friends"), "http://localhost:8080/api/v1/friends");
    }
}
