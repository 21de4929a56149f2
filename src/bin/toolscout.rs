//! `toolscout` binary entrypoint.
//!
//! Serves the check endpoint using configuration from `TOOLSCOUT_*`
//! environment variables. Log output honours `RUST_LOG`.

use toolscout::{config::ScoutConfig, http::serve};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ScoutConfig::from_env()?;
    serve(config).await?;
    Ok(())
}
