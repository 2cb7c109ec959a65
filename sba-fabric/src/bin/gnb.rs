#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::gnb::run().await
}
