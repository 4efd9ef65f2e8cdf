//! IoT platform REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::auth::OAuthClient;
use crate::config::IotConfig;
use crate::error::AppError;
use crate::iot::IotApi;

#[derive(Debug, Deserialize)]
struct IotResponse<T> {
    result: Option<T>,
}

pub struct IotClient {
    base_url: Url,
    oauth: Arc<OAuthClient>,
    http_client: Client,
}

impl IotClient {
    pub fn new(config: &IotConfig, oauth: Arc<OAuthClient>) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::InternalError(format!("Invalid IoT base URL '{}': {}", config.base_url, e))
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            base_url,
            oauth,
            http_client,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::InternalError("IoT base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET an endpoint and unwrap its `result` member.
    ///
    /// A 401 is reported as-is; the background refresher is the only
    /// recovery path for a rejected token.
    async fn get_result(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Option<Value>, AppError> {
        let token = self.oauth.bearer().await?;
        let url = self.endpoint(segments)?;

        let resp = self
            .http_client
            .get(url.clone())
            .query(query)
            .header(AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Upstream(format!("{} timed out", url.path()))
                } else {
                    AppError::Upstream(format!("{} request failed: {}", url.path(), e))
                }
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::UpstreamAuth(format!(
                "{} rejected the access token",
                url.path()
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!("[IoT] {} returned {}: {}", url.path(), status, body);
            return Err(AppError::Upstream(format!("{} returned {}", url.path(), status)));
        }

        let envelope: IotResponse<Value> = resp
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("{} parse failed: {}", url.path(), e)))?;

        Ok(envelope.result)
    }
}

fn present<'a>(pairs: &[(&'a str, Option<&'a str>)]) -> Vec<(&'a str, &'a str)> {
    pairs
        .iter()
        .filter_map(|(key, value)| value.map(|v| (*key, v)))
        .collect()
}

/// `_id` of the first device in a name-filtered listing
fn first_device_id(result: Option<Value>) -> Option<String> {
    result?
        .as_array()?
        .first()?
        .get("_id")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl IotApi for IotClient {
    async fn find_device_id(&self, serial_number: &str) -> Result<Option<String>, AppError> {
        let result = self
            .get_result(&["api", "devices"], &[("name", serial_number)])
            .await?;
        Ok(first_device_id(result))
    }

    async fn device_detail(&self, id: &str) -> Result<Value, AppError> {
        match self
            .get_result(&["api", "devices", id], &[("verbose", "100")])
            .await?
        {
            Some(device) if device.is_object() => Ok(device),
            _ => Err(AppError::NotFound(format!("Device {} not found", id))),
        }
    }

    async fn hourly_usage(
        &self,
        id: &str,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<Value, AppError> {
        let query = present(&[("after", after), ("before", before)]);
        let result = self
            .get_result(&["api", "devices", id, "data-usage", "raw"], &query)
            .await?;
        Ok(result.unwrap_or_else(|| Value::Array(Vec::new())))
    }

    async fn daily_usage(
        &self,
        id: &str,
        oid: Option<&str>,
        month: Option<&str>,
    ) -> Result<Value, AppError> {
        let query = present(&[("device_id", Some(id)), ("oid", oid), ("month", month)]);
        let result = self.get_result(&["api", "traffic_day"], &query).await?;
        Ok(result.unwrap_or_else(|| Value::Array(Vec::new())))
    }

    async fn connection_events(
        &self,
        id: &str,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Value, AppError> {
        let query = present(&[("start_time", start_time), ("end_time", end_time)]);
        let result = self
            .get_result(&["api", "devices", id, "online-events"], &query)
            .await?;
        Ok(result
            .and_then(|r| r.get("data").cloned())
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }
}
