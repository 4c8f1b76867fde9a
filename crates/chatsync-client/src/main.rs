#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatsync_client_lib::run().await
}
