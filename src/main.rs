use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info};
use ytmusic_dl_bot::config::Settings;
use ytmusic_dl_bot::logging::{init_logging, RedactionPatterns};
use ytmusic_dl_bot::runner::run_bot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting YouTube Music download bot...");

    let settings = init_settings();
    run_bot(settings).await;

    Ok(())
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
