use tracing::{error, info};

use corkboard::{BoardClient, Config};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("corkboard.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load corkboard.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = corkboard::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        corkboard::logging::init_console_only(&config.logging.level);
    }

    info!("corkboard {}", env!("CARGO_PKG_VERSION"));

    let client = match BoardClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Board service at {}", client.service().base_url());
    match client.board().ping().await {
        Ok(pong) => info!("Service is up: {}", pong.service_name),
        Err(e) => {
            error!("Ping failed: {}", e);
            std::process::exit(1);
        }
    }
}
