#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sba_fabric::amf::run().await
}
