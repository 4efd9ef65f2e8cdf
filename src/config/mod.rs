//! Configuration module

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub ntlm: NtlmConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub iot: IotConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls_cert_path: None,
            tls_key_path: None,
            static_dir: default_static_dir(),
        }
    }
}

/// Resource-owner credentials posted to the IoT identity endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub password_type: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sent as the `type` form field
    #[serde(default)]
    pub login_type: String,
    /// Sent as the `pwdType` form field
    #[serde(default)]
    pub pwd_type: String,
    #[serde(default)]
    pub language: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_secs: i64,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: String::new(),
            client_secret: String::new(),
            grant_type: String::new(),
            password_type: String::new(),
            username: String::new(),
            password: String::new(),
            login_type: String::new(),
            pwd_type: String::new(),
            language: String::new(),
            refresh_interval_secs: default_refresh_interval(),
            safety_margin_secs: default_safety_margin(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NtlmConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub workstation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_crm_base_url")]
    pub base_url: String,
    #[serde(default = "default_crm_timeout")]
    pub timeout_secs: u64,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_crm_base_url(),
            timeout_secs: default_crm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IotConfig {
    #[serde(default = "default_iot_base_url")]
    pub base_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for IotConfig {
    fn default() -> Self {
        Self {
            base_url: default_iot_base_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

/// Fan-out limits for the device list aggregation
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_account_concurrency")]
    pub account_concurrency: usize,
    #[serde(default = "default_device_concurrency")]
    pub device_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            account_concurrency: default_account_concurrency(),
            device_concurrency: default_device_concurrency(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_static_dir() -> String {
    "frontend/dist".to_string()
}

fn default_token_url() -> String {
    "https://iot.inhandnetworks.com/oauth2/access_token".to_string()
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_safety_margin() -> i64 {
    60
}

fn default_upstream_timeout() -> u64 {
    15
}

fn default_crm_base_url() -> String {
    "http://10.10.0.27/NationalLinkInc".to_string()
}

fn default_crm_timeout() -> u64 {
    30
}

fn default_iot_base_url() -> String {
    "https://iot.inhandnetworks.com".to_string()
}

fn default_account_concurrency() -> usize {
    4
}

fn default_device_concurrency() -> usize {
    8
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("DEVICE_BRIDGE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Names of required settings that are still empty.
    ///
    /// A partially configured process still starts; the gaps surface as
    /// auth failures on first use.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let checks = [
            ("oauth.client_id", &self.oauth.client_id),
            ("oauth.client_secret", &self.oauth.client_secret),
            ("oauth.grant_type", &self.oauth.grant_type),
            ("oauth.password_type", &self.oauth.password_type),
            ("oauth.username", &self.oauth.username),
            ("oauth.password", &self.oauth.password),
            ("oauth.login_type", &self.oauth.login_type),
            ("oauth.pwd_type", &self.oauth.pwd_type),
            ("oauth.language", &self.oauth.language),
            ("ntlm.username", &self.ntlm.username),
            ("ntlm.password", &self.ntlm.password),
            ("ntlm.domain", &self.ntlm.domain),
        ];

        checks
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.server.tls_cert_path, &self.server.tls_key_path) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => {
                Some((cert.as_str(), key.as_str()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 443);
        assert_eq!(config.oauth.safety_margin_secs, 60);
        assert_eq!(config.oauth.refresh_interval_secs, 60);
        assert_eq!(config.pipeline.device_concurrency, 8);
        assert!(config.tls_paths().is_none());
    }

    #[test]
    fn test_missing_required_lists_empty_fields() {
        let mut config = Config::default();
        let missing = config.missing_required();
        assert!(missing.contains(&"oauth.client_id"));
        assert!(missing.contains(&"ntlm.domain"));

        config.oauth.client_id = "client".to_string();
        config.ntlm.domain = "CORP".to_string();
        let missing = config.missing_required();
        assert!(!missing.contains(&"oauth.client_id"));
        assert!(!missing.contains(&"ntlm.domain"));
    }

    #[test]
    fn test_tls_paths_require_both() {
        let mut config = Config::default();
        config.server.tls_cert_path = Some("./ssl/cert.pem".to_string());
        assert!(config.tls_paths().is_none());

        config.server.tls_key_path = Some("./ssl/privkey.pem".to_string());
        assert_eq!(
            config.tls_paths(),
            Some(("./ssl/cert.pem", "./ssl/privkey.pem"))
        );
    }
}
