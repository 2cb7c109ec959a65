#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::nrf::run().await
}
