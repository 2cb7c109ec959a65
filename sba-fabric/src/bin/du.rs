#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::du::run().await
}
