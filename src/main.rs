/// Scheduled entry point for the confirmation batch
/// Loads configuration from the environment (or a .env file), runs one
/// confirmation pass and prints the trigger-shaped result.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use max_confirm::{handle, RunConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RunConfig::from_env();
    let response = handle(&config).await;
    println!("{}", serde_json::to_string(&response)?);

    if response.status_code >= 500 {
        std::process::exit(1);
    }
    Ok(())
}
