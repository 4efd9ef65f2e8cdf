//! CRM integration
//!
//! - `client`: NTLM-authenticated grid and record-page requests
//! - `ntlm`: NTLM message codec used by the client
//! - `templates`: Grid query bodies and CRM URLs
//! - `extract`: Markup scraping into typed facts

pub mod client;
pub mod extract;
pub mod ntlm;
pub mod templates;

pub use client::CrmClient;

use async_trait::async_trait;

use crate::error::AppError;

/// Raw CRM payload source. All methods return the response body as-is.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// Accounts grid filtered by an email address
    async fn query_accounts(&self, email: &str) -> Result<String, AppError>;

    /// Active wireless grid filtered by account name or device name
    async fn query_active_wireless(&self, filter: &str) -> Result<String, AppError>;

    /// Record form page for one wireless entry
    async fn fetch_record_page(
        &self,
        entity_type_id: &str,
        object_id: &str,
    ) -> Result<String, AppError>;
}
