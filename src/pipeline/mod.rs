//! Aggregation pipeline
//!
//! Turns an email address into account → device records by chaining the
//! CRM grid scrapes into IoT lookups. Accounts and devices are fanned out
//! with bounded concurrency; each item resolves to `Result<_, SkipReason>`
//! and skipped items are logged and dropped, so one bad account or device
//! never fails the whole request. Output order follows the CRM order.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::crm::{extract, CrmApi};
use crate::error::AppError;
use crate::iot::IotApi;
use crate::models::{
    AccountDevices, ConnectionStatusQuery, DataUsageQuery, DeviceExtra, DeviceListing,
    DeviceSummary, DeviceWithExtras,
};

/// Why an account or device was left out of a listing
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("account '{account}' could not be scraped: {source}")]
    AccountScrape { account: String, source: AppError },

    #[error("serial {serial} is not provisioned on the IoT platform")]
    NotProvisioned { serial: String },

    #[error("device lookup for serial {serial} failed: {source}")]
    DeviceLookup { serial: String, source: AppError },

    #[error("device record for serial {serial} is malformed: {reason}")]
    MalformedDevice { serial: String, reason: String },
}

/// Drop skipped items, logging each one
fn keep_resolved<T>(results: Vec<Result<T, SkipReason>>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(item) => Some(item),
            Err(reason) => {
                tracing::warn!("[Pipeline] Skipped: {}", reason);
                None
            }
        })
        .collect()
}

pub struct AggregationPipeline {
    crm: Arc<dyn CrmApi>,
    iot: Arc<dyn IotApi>,
    account_concurrency: usize,
    device_concurrency: usize,
}

impl AggregationPipeline {
    pub fn new(
        crm: Arc<dyn CrmApi>,
        iot: Arc<dyn IotApi>,
        account_concurrency: usize,
        device_concurrency: usize,
    ) -> Self {
        Self {
            crm,
            iot,
            account_concurrency: account_concurrency.max(1),
            device_concurrency: device_concurrency.max(1),
        }
    }

    /// All active devices of every account linked to `email`.
    ///
    /// Only the initial account query is fatal.
    pub async fn list_devices_by_email(&self, email: &str) -> Result<DeviceListing, AppError> {
        let html = self.crm.query_accounts(email).await?;
        let accounts = extract::account_names(&html);

        if accounts.is_empty() {
            tracing::info!("[Pipeline] No accounts found for {}", email);
            return Ok(DeviceListing::no_accounts());
        }

        tracing::debug!("[Pipeline] {} accounts for {}", accounts.len(), email);

        let results: Vec<Result<AccountDevices, SkipReason>> = stream::iter(accounts)
            .map(|account| self.collect_account(account))
            .buffered(self.account_concurrency)
            .collect()
            .await;

        Ok(DeviceListing {
            data: keep_resolved(results),
            message: None,
        })
    }

    async fn collect_account(&self, account: String) -> Result<AccountDevices, SkipReason> {
        let html = match self.crm.query_active_wireless(&account).await {
            Ok(html) => html,
            Err(source) => return Err(SkipReason::AccountScrape { account, source }),
        };
        let serials = extract::active_serials(&html);

        let lookups: Vec<Result<DeviceSummary, SkipReason>> = stream::iter(serials)
            .map(|serial| self.resolve_device(serial))
            .buffered(self.device_concurrency)
            .collect()
            .await;

        Ok(AccountDevices {
            account_name: account,
            devices: keep_resolved(lookups),
        })
    }

    async fn resolve_device(&self, serial: String) -> Result<DeviceSummary, SkipReason> {
        let id = match self.iot.find_device_id(&serial).await {
            Ok(Some(id)) => id,
            Ok(None) => return Err(SkipReason::NotProvisioned { serial }),
            Err(source) => return Err(SkipReason::DeviceLookup { serial, source }),
        };

        let detail = match self.iot.device_detail(&id).await {
            Ok(detail) => detail,
            Err(source) => return Err(SkipReason::DeviceLookup { serial, source }),
        };

        let device: DeviceSummary =
            serde_json::from_value(detail).map_err(|e| SkipReason::MalformedDevice {
                serial: serial.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            "[Pipeline] Serial {} -> device {} (iccid {})",
            serial,
            device.id,
            device.iccid().unwrap_or("-")
        );
        Ok(device)
    }

    /// One device plus plan/rate scraped from its CRM record.
    ///
    /// The device lookup is fatal; the CRM side only ever degrades `extra`.
    pub async fn get_device_with_extras(&self, id: &str) -> Result<DeviceWithExtras, AppError> {
        let device = self.iot.device_detail(id).await?;
        let name = device
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let extra = self.resolve_extra(id, &name).await;
        Ok(DeviceWithExtras { device, extra })
    }

    async fn resolve_extra(&self, id: &str, name: &str) -> DeviceExtra {
        if name.trim().is_empty() {
            tracing::warn!("[Pipeline] Device {} has no name, skipping CRM extras", id);
            return DeviceExtra::empty();
        }

        let grid = match self.crm.query_active_wireless(name).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("[Pipeline] CRM lookup for device {} ({}) failed: {}", id, name, e);
                return DeviceExtra::empty();
            }
        };

        let reference = extract::entity_reference(&grid);
        let Some((entity_type_id, object_id)) = reference.complete() else {
            tracing::warn!(
                "[Pipeline] No CRM record reference for device {} ({}): {:?}",
                id,
                name,
                reference
            );
            return DeviceExtra::empty();
        };

        match self.crm.fetch_record_page(entity_type_id, object_id).await {
            Ok(page) => extract::embedded_entity_data(&page),
            Err(e) => {
                tracing::warn!("[Pipeline] CRM record page for device {} failed: {}", id, e);
                DeviceExtra::empty()
            }
        }
    }

    /// Traffic for one device; `unit` picks hourly samples or daily totals
    pub async fn data_usage(&self, id: &str, query: &DataUsageQuery) -> Result<Value, AppError> {
        match query.unit.as_deref().unwrap_or("day") {
            "hour" => {
                self.iot
                    .hourly_usage(id, query.after.as_deref(), query.before.as_deref())
                    .await
            }
            "day" => {
                self.iot
                    .daily_usage(id, query.oid.as_deref(), query.month.as_deref())
                    .await
            }
            other => Err(AppError::BadRequest(format!("Unsupported unit '{}'", other))),
        }
    }

    pub async fn connection_status(
        &self,
        id: &str,
        query: &ConnectionStatusQuery,
    ) -> Result<Value, AppError> {
        self.iot
            .connection_events(id, query.start_time.as_deref(), query.end_time.as_deref())
            .await
    }
}
