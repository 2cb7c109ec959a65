#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::pcf::run().await
}
