#[tokio::main]
async fn main() -> anyhow::Result<()> {
    focusgate::run().await
}
