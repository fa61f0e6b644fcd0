//! Picweave Server - HTTP REST API for sentence-to-image matching
//!
//! This binary serves the picweave pipeline via REST endpoints with
//! authentication and rate limiting.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set environment variables directly
    dotenvy::dotenv().ok();

    let config = ServerConfig::load()?;

    server::start_server(config).await?;

    Ok(())
}
