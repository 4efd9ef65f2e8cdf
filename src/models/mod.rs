//! Data models for the device bridge

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// IoT device models
// ============================================================================

/// Device record as returned by the IoT platform's verbose detail call.
///
/// Only the fields the dashboard reads are typed; everything else is kept
/// in `rest` so the record is serialized back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "serialNumber", default, deserialize_with = "lenient_string")]
    pub serial_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub online: bool,
    #[serde(rename = "logtime", default, skip_serializing_if = "Option::is_none")]
    pub log_time: Option<Value>,
    #[serde(
        rename = "signalStrength",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signal: Option<SignalStrength>,
    #[serde(
        rename = "address",
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DeviceInfo>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl DeviceSummary {
    pub fn iccid(&self) -> Option<&str> {
        self.info.as_ref().and_then(|i| i.iccid.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalStrength {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<serde_json::Number>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub iccid: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// `online` arrives as a bool from most firmware and as 0/1 from some.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        Value::String(s) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

/// Strings may arrive as `null` or as bare numbers
fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

// ============================================================================
// CRM-derived models
// ============================================================================

/// Identifiers needed to address a CRM record page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityReference {
    pub entity_type_id: Option<String>,
    pub object_id: Option<String>,
}

impl EntityReference {
    /// Both identifiers, if both were recovered
    pub fn complete(&self) -> Option<(&str, &str)> {
        match (&self.entity_type_id, &self.object_id) {
            (Some(etc), Some(oid)) => Some((etc.as_str(), oid.as_str())),
            _ => None,
        }
    }
}

/// Plan and rate scraped from a CRM wireless record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExtra {
    pub wireless_plan: String,
    pub monthly_rate: String,
}

impl DeviceExtra {
    pub const NOT_AVAILABLE: &'static str = "N/A";

    /// Record page was never reached
    pub fn empty() -> Self {
        Self {
            wireless_plan: String::new(),
            monthly_rate: String::new(),
        }
    }

    /// Record page was reached but the fields could not be read
    pub fn not_available() -> Self {
        Self {
            wireless_plan: Self::NOT_AVAILABLE.to_string(),
            monthly_rate: Self::NOT_AVAILABLE.to_string(),
        }
    }
}

// ============================================================================
// Response models
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDevices {
    pub account_name: String,
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceListing {
    pub data: Vec<AccountDevices>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DeviceListing {
    pub const NO_ACCOUNTS: &'static str = "No accounts found for the provided email.";

    pub fn no_accounts() -> Self {
        Self {
            data: Vec::new(),
            message: Some(Self::NO_ACCOUNTS.to_string()),
        }
    }
}

/// Device detail exactly as the IoT platform returned it, plus CRM extras
#[derive(Debug, Clone, Serialize)]
pub struct DeviceWithExtras {
    #[serde(rename = "result")]
    pub device: Value,
    #[serde(rename = "extraData")]
    pub extra: DeviceExtra,
}

#[derive(Debug, Deserialize)]
pub struct DeviceListRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DataUsageQuery {
    pub oid: Option<String>,
    pub unit: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConnectionStatusQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}
