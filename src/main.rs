#![deny(clippy::all)]

mod audio;
mod client;
mod config;
mod encoder;
mod error;
mod protocol;
mod relay;
mod storage;
mod transcript;

use config::Config;
use error::AppError;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment overrides may come from a local .env file
    dotenvy::dotenv().ok();

    // Initialize tracing for structured logging
    tracing_subscriber::fmt::init();

    let config = Config::load()?;

    // `serve` runs the relay/aggregation service; `record` runs a
    // recording session against it.
    let mode = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());
    info!("echonote v{} starting in {} mode", env!("CARGO_PKG_VERSION"), mode);

    match mode.as_str() {
        "serve" => relay::serve(&config).await,
        "record" => client::record(&config).await,
        other => Err(AppError::UnknownMode(other.to_string()).into()),
    }
}
