#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::cu::run().await
}
