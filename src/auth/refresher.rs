//! TokenRefresher: keeps the IoT bearer token fresh
//!
//! Runs in a background tokio task for the life of the process. The first
//! tick fires immediately (startup acquisition); after that the store is
//! checked every `refresh_interval_secs` and refreshed when inside the
//! safety margin. Failures are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::auth::oauth::OAuthClient;

pub struct TokenRefresher {
    oauth: Arc<OAuthClient>,
    period: Duration,
}

impl TokenRefresher {
    pub fn new(oauth: Arc<OAuthClient>, period: Duration) -> Self {
        Self { oauth, period }
    }

    /// Start the refresh loop (runs forever)
    pub async fn start(self: Arc<Self>) {
        tracing::info!(
            "[OAuth] Starting token refresher (interval: {}s)",
            self.period.as_secs()
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        match self.oauth.ensure_validity().await {
            Ok(true) => tracing::debug!("[OAuth] Token refreshed"),
            Ok(false) => {}
            Err(e) => tracing::error!("[OAuth] Scheduled token refresh failed: {}", e),
        }
    }
}
