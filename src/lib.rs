pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

pub use config::Settings;
pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;

pub use auth::{LoginRateLimiter, RateLimitConfig, SessionManager, TokenCodec, TokenPair};
pub use db::{AuthStore, PgAuthStore, RefreshToken, User};

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let store = PgAuthStore::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(5),
        )
        .await?;

        let sessions = SessionManager::new(
            Arc::new(store),
            &config.auth,
            RateLimitConfig::from(&config.rate_limit),
        )?;

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
        })
    }
}
