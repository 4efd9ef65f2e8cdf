//! NTLM-authenticated client for the on-premises CRM

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, REFERER, WWW_AUTHENTICATE};
use reqwest::{Client, Method, StatusCode};

use crate::config::{CrmConfig, NtlmConfig};
use crate::crm::ntlm::{self, NtlmCredentials};
use crate::crm::templates::{self, GridView, ACTIVE_ACCOUNTS, ACTIVE_WIRELESS};
use crate::crm::CrmApi;
use crate::error::AppError;

pub struct CrmClient {
    base_url: String,
    credentials: NtlmCredentials,
    timeout: Duration,
}

impl CrmClient {
    pub fn new(crm: &CrmConfig, ntlm: &NtlmConfig) -> Self {
        Self {
            base_url: crm.base_url.trim_end_matches('/').to_string(),
            credentials: NtlmCredentials {
                username: ntlm.username.clone(),
                password: ntlm.password.clone(),
                domain: ntlm.domain.clone(),
                workstation: ntlm.workstation.clone(),
            },
            timeout: Duration::from_secs(crm.timeout_secs),
        }
    }

    async fn query_grid(&self, view: &GridView, quickfind: &str) -> Result<String, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        if let Ok(referer) = HeaderValue::from_str(&view.referer(&self.base_url)) {
            headers.insert(REFERER, referer);
        }

        self.exchange(
            Method::POST,
            &templates::grid_url(&self.base_url),
            headers,
            Some(view.render(quickfind)),
        )
        .await
    }

    /// One NTLM-authenticated request.
    ///
    /// The handshake is bound to a TCP connection, so each exchange gets its
    /// own single-connection client and the three legs reuse it.
    async fn exchange(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<String, AppError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| AppError::Crm(format!("HTTP client build failed: {}", e)))?;

        // Leg 1: NEGOTIATE, body withheld until authenticated
        let negotiate = client
            .request(method.clone(), url)
            .headers(headers.clone())
            .header(AUTHORIZATION, ntlm::header_value(&ntlm::negotiate_message()))
            .body(Vec::new())
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = negotiate.status();
        if status.is_success() {
            return negotiate.text().await.map_err(|e| transport_error(url, e));
        }
        if status != StatusCode::UNAUTHORIZED {
            return Err(AppError::Crm(format!("{} returned {}", url, status)));
        }

        // Leg 2: CHALLENGE
        let challenge = negotiate
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("NTLM "))
            .ok_or(ntlm::NtlmError::MissingChallenge)
            .and_then(ntlm::challenge_from_header)
            .map_err(|e| AppError::Crm(format!("NTLM handshake with {} failed: {}", url, e)))?;

        // Drain so the connection returns to the pool for leg 3
        let _ = negotiate.bytes().await;

        // Leg 3: AUTHENTICATE with the real request
        let authenticate =
            ntlm::authenticate_message(&self.credentials, &challenge, rand::random())
                .map_err(|e| AppError::Crm(format!("NTLM handshake with {} failed: {}", url, e)))?;

        let mut request = client
            .request(method, url)
            .headers(headers)
            .header(AUTHORIZATION, ntlm::header_value(&authenticate));
        request = match body {
            Some(body) => request.body(body),
            None => request,
        };

        let resp = request.send().await.map_err(|e| transport_error(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("[CRM] {} returned {} after NTLM handshake", url, status);
            return Err(AppError::Crm(format!("{} returned {}", url, status)));
        }

        resp.text().await.map_err(|e| transport_error(url, e))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Crm(format!("{} timed out", url))
    } else {
        AppError::Crm(format!("{} request failed: {}", url, e))
    }
}

#[async_trait]
impl CrmApi for CrmClient {
    async fn query_accounts(&self, email: &str) -> Result<String, AppError> {
        self.query_grid(&ACTIVE_ACCOUNTS, email).await
    }

    async fn query_active_wireless(&self, filter: &str) -> Result<String, AppError> {
        self.query_grid(&ACTIVE_WIRELESS, filter).await
    }

    async fn fetch_record_page(
        &self,
        entity_type_id: &str,
        object_id: &str,
    ) -> Result<String, AppError> {
        let url = templates::record_page_url(&self.base_url, entity_type_id, object_id);
        self.exchange(Method::GET, &url, HeaderMap::new(), None).await
    }
}
