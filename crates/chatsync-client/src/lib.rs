pub mod config;
pub mod console;
pub mod events;
pub mod projector;
pub mod runtime;
pub mod session;
pub mod synchronizer;

use tracing_subscriber::{fmt, EnvFilter};

use chatsync_shared::constants::APP_NAME;

use crate::config::ClientConfig;
use crate::runtime::ChatRuntime;

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("chatsync_client_lib=debug,chatsync_net=debug,chatsync_store=info,warn")
    });

    // stdout belongs to the console.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    tracing::info!(app = APP_NAME, "Starting console client");

    let config = ClientConfig::from_env();
    let runtime = ChatRuntime::start(config).await?;
    console::run_console(runtime).await
}
