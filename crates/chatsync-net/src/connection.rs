//! Realtime connection manager with tokio mpsc command/notification pattern.
//!
//! One background task per session owns the WebSocket. The application
//! talks to it through [`TransportCommand`] and hears from it through
//! [`TransportNotification`]; the task never touches conversation data.
//! Dropped connections are re-established with capped exponential backoff,
//! and nothing missed while disconnected is replayed.

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use chatsync_shared::constants::{TRANSPORT_CHANNEL_CAPACITY, WS_TOKEN_PARAM};
use chatsync_shared::protocol::{decode_event, InboundEvent};
use chatsync_shared::types::{ConnectionState, UserId};

use crate::backoff::{Backoff, BackoffConfig};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Close the socket and stop reconnecting.
    Disconnect,
}

/// Notifications sent *from* the connection task to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportNotification {
    StateChanged(ConnectionState),
    Event(InboundEvent),
}

/// Where and how to connect. Injected, never hard-coded.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `ws://host/ws`.
    pub url: String,
    pub backoff: BackoffConfig,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns at most one live connection task.
pub struct ConnectionManager {
    config: ConnectionConfig,
    cmd_tx: Option<mpsc::Sender<TransportCommand>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            cmd_tx: None,
            task: None,
        }
    }

    /// Open the session's connection and return its notification stream.
    ///
    /// Calling this while a connection task is alive replaces it.
    pub fn connect(
        &mut self,
        self_id: UserId,
        credential: String,
    ) -> mpsc::Receiver<TransportNotification> {
        if let Some(task) = self.task.take() {
            warn!("connect called on a live connection, replacing it");
            task.abort();
            self.cmd_tx = None;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel::<TransportCommand>(8);
        let (notif_tx, notif_rx) = mpsc::channel::<TransportNotification>(TRANSPORT_CHANNEL_CAPACITY);

        let config = self.config.clone();
        let task = tokio::spawn(async move {
            connection_loop(config, self_id, credential, cmd_rx, notif_tx).await;
        });

        self.cmd_tx = Some(cmd_tx);
        self.task = Some(task);
        notif_rx
    }

    /// Close the connection and wait for the task to finish.
    pub async fn disconnect(&mut self) {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            let _ = cmd_tx.send(TransportCommand::Disconnect).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Connection task failed");
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

enum PumpExit {
    /// Disconnect requested by the application.
    Shutdown,
    /// The socket went away; reconnect.
    Dropped(String),
    /// Nobody is listening anymore.
    ReceiverGone,
}

async fn connection_loop(
    config: ConnectionConfig,
    self_id: UserId,
    credential: String,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    notif_tx: mpsc::Sender<TransportNotification>,
) {
    let mut backoff = Backoff::new(config.backoff.clone());

    info!(url = %config.url, user = %self_id.short(), "Realtime connection task started");

    loop {
        if !notify(&notif_tx, TransportNotification::StateChanged(ConnectionState::Connecting)).await {
            break;
        }

        let request = match build_request(&config.url, &credential) {
            Ok(r) => r,
            Err(e) => {
                error!(url = %config.url, error = %e, "Invalid realtime endpoint, giving up");
                notify(&notif_tx, TransportNotification::StateChanged(ConnectionState::Disconnected)).await;
                break;
            }
        };

        let attempt = tokio::select! {
            res = connect_async(request) => res,
            _ = cmd_rx.recv() => {
                info!("Disconnect requested while connecting");
                notify(&notif_tx, TransportNotification::StateChanged(ConnectionState::Disconnected)).await;
                break;
            }
        };

        match attempt {
            Ok((ws, _response)) => {
                backoff.reset();
                info!(url = %config.url, "Realtime connection established");
                if !notify(&notif_tx, TransportNotification::StateChanged(ConnectionState::Connected)).await {
                    break;
                }

                match pump(ws, &self_id, &mut cmd_rx, &notif_tx).await {
                    PumpExit::Shutdown => {
                        info!("Realtime connection closed on request");
                        notify(&notif_tx, TransportNotification::StateChanged(ConnectionState::Disconnected)).await;
                        break;
                    }
                    PumpExit::ReceiverGone => break,
                    PumpExit::Dropped(reason) => {
                        warn!(reason = %reason, "Realtime connection dropped");
                    }
                }
            }
            Err(e) => {
                warn!(
                    url = %config.url,
                    attempt = backoff.attempt(),
                    error = %e,
                    "Realtime connect failed"
                );
            }
        }

        if !notify(&notif_tx, TransportNotification::StateChanged(ConnectionState::Disconnected)).await {
            break;
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cmd_rx.recv() => {
                info!("Disconnect requested during backoff");
                break;
            }
        }
    }

    info!("Realtime connection task terminated");
}

/// Forward frames until the socket drops or a command stops us.
async fn pump(
    mut ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    self_id: &UserId,
    cmd_rx: &mut mpsc::Receiver<TransportCommand>,
    notif_tx: &mpsc::Sender<TransportNotification>,
) -> PumpExit {
    loop {
        tokio::select! {
            // Disconnect, or the manager was dropped
            _ = cmd_rx.recv() => {
                if let Err(e) = ws.close(None).await {
                    debug!(error = %e, "Close handshake failed");
                }
                return PumpExit::Shutdown;
            }

            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match decode_event(&text, self_id, Utc::now()) {
                        Ok(event) => {
                            debug!(event = ?event, "Realtime event received");
                            if notif_tx.send(TransportNotification::Event(event)).await.is_err() {
                                return PumpExit::ReceiverGone;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, len = text.len(), "Dropping malformed realtime event");
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    if let Err(e) = ws.send(WsMessage::Pong(payload)).await {
                        return PumpExit::Dropped(e.to_string());
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server: {} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return PumpExit::Dropped(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                None => return PumpExit::Dropped("stream ended".to_string()),
            }
        }
    }
}

async fn notify(notif_tx: &mpsc::Sender<TransportNotification>, notification: TransportNotification) -> bool {
    notif_tx.send(notification).await.is_ok()
}

/// Handshake request carrying the credential as `?token=` and as a bearer header.
fn build_request(url: &str, credential: &str) -> anyhow::Result<Request> {
    let mut target = reqwest::Url::parse(url)?;
    target
        .query_pairs_mut()
        .append_pair(WS_TOKEN_PARAM, credential);

    let mut request = target.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {credential}"))?);
    Ok(request)
}
