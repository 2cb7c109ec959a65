#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::smf::run().await
}
