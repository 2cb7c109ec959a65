#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::ausf::run().await
}
