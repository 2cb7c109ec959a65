#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::udm::run().await
}
