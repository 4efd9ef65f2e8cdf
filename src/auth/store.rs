//! Bearer credential storage

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

/// An issued access token. Immutable once built; refreshes replace it whole.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// `expires_at` is `issued_at + expires_in - safety_margin`, so the
    /// token reads as invalid strictly before the provider expires it.
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        safety_margin: Duration,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            issued_at,
            expires_at: issued_at + Duration::seconds(expires_in_secs) - safety_margin,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && now < self.expires_at
    }
}

/// Holds the current credential for every outbound IoT call.
///
/// Readers get an `Arc` snapshot, so a refresh never tears a value that an
/// in-flight request is still using.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<Arc<Credential>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now()).await
    }

    pub async fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| c.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Atomically replace the stored credential
    pub async fn set(&self, credential: Credential) {
        let mut current = self.current.write().await;
        *current = Some(Arc::new(credential));
    }

    /// The stored credential, valid or not
    pub async fn current(&self) -> Option<Arc<Credential>> {
        self.current.read().await.clone()
    }

    /// The stored credential if it is still inside its validity window
    pub async fn valid(&self) -> Option<Arc<Credential>> {
        let now = Utc::now();
        self.current
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_valid_at(now))
            .cloned()
    }
}
