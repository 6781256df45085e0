use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::config::RateLimitSettings;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Failed attempts tolerated per identifier within the window.
    pub max_attempts: u32,
    /// Trailing window over which attempts are counted.
    pub window: Duration,
    /// Cap on distinct identifiers tracked at once. When full, recording
    /// a new identifier evicts the one that failed least recently.
    pub max_identifiers: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            max_identifiers: 10_000,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window: Duration::minutes(settings.window_minutes),
            max_identifiers: settings.max_identifiers as usize,
        }
    }
}

#[derive(Debug)]
struct AttemptWindow {
    timestamps: Vec<DateTime<Utc>>,
}

impl AttemptWindow {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
        }
    }

    fn cleanup_old_attempts(&mut self, window: Duration) {
        let cutoff = Utc::now() - window;
        self.timestamps.retain(|ts| *ts > cutoff);
    }

    fn add_attempt(&mut self) {
        self.timestamps.push(Utc::now());
    }

    fn attempt_count(&self) -> usize {
        self.timestamps.len()
    }

    fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

/// Sliding-window counter of failed login attempts per identifier.
///
/// Process-local and advisory: counters reset on restart, and replicas
/// do not share state. It slows down brute force against one instance,
/// it is not a distributed limiter.
pub struct LoginRateLimiter {
    windows: RwLock<HashMap<String, AttemptWindow>>,
    config: RateLimitConfig,
}

impl LoginRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True iff the identifier is under the attempt threshold for the
    /// trailing window. Does not record an attempt.
    pub async fn is_allowed(&self, identifier: &str) -> bool {
        let mut windows = self.windows.write().await;

        let count = match windows.get_mut(identifier) {
            Some(window) => {
                window.cleanup_old_attempts(self.config.window);
                window.attempt_count()
            }
            None => return true,
        };

        if count == 0 {
            windows.remove(identifier);
            return true;
        }

        count < self.config.max_attempts as usize
    }

    /// Record a failed attempt. Callers only invoke this after a failed
    /// authentication; successful logins never count.
    pub async fn record_attempt(&self, identifier: &str) {
        let mut windows = self.windows.write().await;

        if !windows.contains_key(identifier) && windows.len() >= self.config.max_identifiers {
            Self::evict_stalest(&mut windows);
        }

        windows
            .entry(identifier.to_string())
            .or_insert_with(AttemptWindow::new)
            .add_attempt();
    }

    /// Drop identifiers whose attempts have all aged out of the window.
    /// Run periodically from the maintenance job.
    pub async fn sweep(&self) {
        let mut windows = self.windows.write().await;

        windows.retain(|_, window| {
            window.cleanup_old_attempts(self.config.window);
            !window.timestamps.is_empty()
        });
    }

    fn evict_stalest(windows: &mut HashMap<String, AttemptWindow>) {
        let stalest = windows
            .iter()
            .min_by_key(|(_, window)| window.last_attempt())
            .map(|(identifier, _)| identifier.clone());

        if let Some(identifier) = stalest {
            windows.remove(&identifier);
        }
    }

    #[cfg(test)]
    async fn tracked_identifiers(&self) -> usize {
        self.windows.read().await.len()
    }
}
