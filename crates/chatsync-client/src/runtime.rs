//! Wires the REST client, the connection manager and the synchronizer
//! together for one signed-in session.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use chatsync_net::{ChatApi, ConnectionManager, HttpApi};

use crate::config::ClientConfig;
use crate::events::ViewUpdate;
use crate::session::Session;
use crate::synchronizer::{Synchronizer, UiIntent};

const INTENT_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running session.
pub struct ChatRuntime {
    intents: mpsc::Sender<UiIntent>,
    updates: mpsc::UnboundedReceiver<ViewUpdate>,
    task: JoinHandle<()>,
}

impl ChatRuntime {
    /// Resolve the signed-in user, open the realtime connection and start
    /// the synchronizer.
    pub async fn start(config: ClientConfig) -> anyhow::Result<Self> {
        let token = config.require_token()?.to_string();
        let api = HttpApi::new(&config.api_url, &token, config.request_timeout)
            .context("Failed to build HTTP client")?;

        let profile = api
            .resolve_self()
            .await
            .context("Failed to resolve the signed-in user")?;
        info!(user = %profile.identity, name = %profile.display_name, "Signed in");

        let session = Session::new(profile, token.clone(), config.clone());
        let mut manager = ConnectionManager::new(config.connection());
        let transport = manager.connect(session.self_id().clone(), token);

        let (update_tx, updates) = mpsc::unbounded_channel();
        let (intents, intent_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        let (sync, completions) = Synchronizer::new(session, Arc::new(api), update_tx);

        let task = tokio::spawn(async move {
            sync.run(transport, intent_rx, completions).await;
            manager.disconnect().await;
            info!("Session closed");
        });

        Ok(Self {
            intents,
            updates,
            task,
        })
    }

    pub fn intents(&self) -> mpsc::Sender<UiIntent> {
        self.intents.clone()
    }

    /// Next view update; `None` once the session has shut down.
    pub async fn next_update(&mut self) -> Option<ViewUpdate> {
        self.updates.recv().await
    }

    /// Close the view and wait for the connection to be torn down.
    pub async fn shutdown(self) {
        let _ = self.intents.send(UiIntent::Close).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Session task failed");
        }
    }
}
