use authd::{AppState, Settings};
use dotenv::dotenv;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Maintenance daemon for the session subsystem: connects to the
/// database and periodically purges expired refresh tokens. The HTTP
/// layer embeds `authd` as a library and wires `SessionManager` into
/// its own handlers.
#[tokio::main]
async fn main() -> authd::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    let interval = Duration::from_secs(config.cleanup.interval_minutes * 60);

    // Initialize application state
    let state = AppState::new(config).await?;
    info!(
        "Session store connected, running cleanup every {:?}",
        interval
    );

    let cleanup_state = state.clone();
    let cleanup = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match cleanup_state.sessions.cleanup().await {
                Ok(purged) => info!("Cleanup pass removed {} expired tokens", purged),
                Err(e) => error!("Cleanup pass failed: {}", e),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cleanup.abort();

    Ok(())
}
