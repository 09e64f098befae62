//! Binary entrypoint.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mnemos::cli::run().await
}
