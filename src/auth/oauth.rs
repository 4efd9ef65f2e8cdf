//! OAuth2 client for the IoT platform identity endpoint

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::store::{Credential, TokenStore};
use crate::config::OAuthConfig;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Outcome of the most recent acquisition, when it failed
#[derive(Debug)]
struct FailedAttempt {
    finished_at: Instant,
    message: String,
}

pub struct OAuthClient {
    config: OAuthConfig,
    store: Arc<TokenStore>,
    http_client: Client,
    // One acquisition at a time; holds the last failure for queued callers
    refresh_lock: Mutex<Option<FailedAttempt>>,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, store: Arc<TokenStore>) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            config,
            store,
            http_client,
            refresh_lock: Mutex::new(None),
        })
    }

    /// Exchange the configured resource-owner credentials for a token
    pub async fn acquire(&self) -> Result<Credential, AppError> {
        let cfg = &self.config;
        let form = [
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("grant_type", cfg.grant_type.as_str()),
            ("password_type", cfg.password_type.as_str()),
            ("username", cfg.username.as_str()),
            ("password", cfg.password.as_str()),
            ("type", cfg.login_type.as_str()),
            ("pwdType", cfg.pwd_type.as_str()),
            ("language", cfg.language.as_str()),
        ];

        let resp = self
            .http_client
            .post(&cfg.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Token request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("[OAuth] Identity endpoint returned {}: {}", status, body);
            return Err(AppError::Auth(format!("Token request returned {}", status)));
        }

        let grant: TokenGrant = resp
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("Token parse failed: {}", e)))?;

        Ok(self.credential_from(grant))
    }

    fn credential_from(&self, grant: TokenGrant) -> Credential {
        Credential::new(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            chrono::Duration::seconds(self.config.safety_margin_secs),
            Utc::now(),
        )
    }

    /// Acquire and store a new token unless the current one is still valid.
    ///
    /// Returns whether a refresh happened. On failure the previous
    /// credential stays in the store. Callers that queued while an
    /// acquisition was failing get that failure instead of a new attempt.
    pub async fn ensure_validity(&self) -> Result<bool, AppError> {
        let requested_at = Instant::now();
        let mut last_failure = self.refresh_lock.lock().await;

        if self.store.is_valid().await {
            return Ok(false);
        }

        if let Some(failure) = last_failure
            .as_ref()
            .filter(|f| f.finished_at >= requested_at)
        {
            return Err(AppError::Auth(failure.message.clone()));
        }

        match self.acquire().await {
            Ok(credential) => {
                *last_failure = None;
                let expires_at = credential.expires_at;
                self.store.set(credential).await;

                tracing::info!("[OAuth] Access token acquired, refresh due at {}", expires_at);
                Ok(true)
            }
            Err(e) => {
                tracing::error!("[OAuth] Token acquisition failed: {}", e);
                let message = match &e {
                    AppError::Auth(msg) => msg.clone(),
                    other => other.to_string(),
                };
                *last_failure = Some(FailedAttempt {
                    finished_at: Instant::now(),
                    message,
                });
                Err(e)
            }
        }
    }

    /// Token to attach to an outbound IoT call.
    ///
    /// A held token is returned as-is even past its refresh point; replacing
    /// it is the refresher's job. Only an empty store acquires inline.
    pub async fn bearer(&self) -> Result<String, AppError> {
        if let Some(token) = self.held_token().await {
            return Ok(token);
        }

        self.ensure_validity().await?;

        self.held_token()
            .await
            .ok_or_else(|| AppError::Auth("No access token available".to_string()))
    }

    async fn held_token(&self) -> Option<String> {
        let credential = self.store.current().await?;
        if credential.access_token.is_empty() {
            return None;
        }
        if !credential.is_valid_at(Utc::now()) {
            tracing::debug!(
                "[OAuth] Token past its refresh point ({}), awaiting refresher",
                credential.expires_at
            );
        }
        Some(credential.access_token.clone())
    }
}
