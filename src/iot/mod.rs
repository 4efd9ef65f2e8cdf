//! IoT platform integration
//!
//! - `client`: Bearer-authenticated REST client for device lookups and telemetry

pub mod client;

pub use client::IotClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;

/// Device lookups and telemetry reads against the IoT platform.
///
/// Payloads are returned as the platform's `result` member, untouched.
#[async_trait]
pub trait IotApi: Send + Sync {
    /// Device id for a serial number; `None` when not provisioned
    async fn find_device_id(&self, serial_number: &str) -> Result<Option<String>, AppError>;

    /// Verbose device record
    async fn device_detail(&self, id: &str) -> Result<Value, AppError>;

    /// Raw (hourly) traffic samples between two timestamps
    async fn hourly_usage(
        &self,
        id: &str,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<Value, AppError>;

    /// Per-day traffic for one month
    async fn daily_usage(
        &self,
        id: &str,
        oid: Option<&str>,
        month: Option<&str>,
    ) -> Result<Value, AppError>;

    /// Online/offline transitions between two timestamps
    async fn connection_events(
        &self,
        id: &str,
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Value, AppError>;
}
