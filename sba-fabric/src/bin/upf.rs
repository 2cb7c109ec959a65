#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::upf::run().await
}
