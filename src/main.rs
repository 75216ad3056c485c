//! assistant-relay binary.
//!
//! Reads `.env` if present, configures logging from `RELAY_LOG_*`, registers
//! the assistant and serves until Ctrl-C.

use std::sync::Arc;

use assistant_relay::assistants::AssistantsClient;
use assistant_relay::config::RelayConfig;
use assistant_relay::server::{self, AppState};
use assistant_relay::service::RelayService;
use assistant_relay::telemetry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is not an error.
    let dotenv = dotenvy::dotenv();
    let _guard = telemetry::init_from_env()?;
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    if let Err(e) = run().await {
        error!(error = %e, "relay exited with error");
        return Err(e.into());
    }
    Ok(())
}

async fn run() -> assistant_relay::Result<()> {
    let config = RelayConfig::from_env()?;
    let client = AssistantsClient::from_config(config.openai.clone())?;
    info!(base_url = %client.base_url(), "assistants client ready");

    let relay = RelayService::bootstrap(&config, Arc::new(client)).await?;
    server::serve(&config.server, AppState::new(relay)).await
}
