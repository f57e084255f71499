//! Application configuration — TOML file at startup, overridable by
//! environment variables for secrets (SPEC_FULL.md §2; spec.md §6).

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::shared::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    ProviderA,
    ProviderB,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ws_host")]
    pub ws_host: String,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_ws_host() -> String {
    "0.0.0.0".to_owned()
}
fn default_ws_port() -> u16 {
    9000
}
fn default_api_host() -> String {
    "0.0.0.0".to_owned()
}
fn default_api_port() -> u16 {
    8080
}
fn default_shutdown_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://evcsms.db?mode=rwc".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Every §6-enumerated key of spec.md is a field here.
#[derive(Debug, Clone, Deserialize)]
pub struct OcppConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: i64,
    #[serde(default = "default_boot_accept")]
    pub boot_accept: bool,
    #[serde(default = "default_call_timeout")]
    pub call_timeout: i64,
    #[serde(default = "default_max_sockets")]
    pub max_sockets_per_process: usize,
}

fn default_heartbeat_interval() -> i64 {
    300
}
fn default_boot_accept() -> bool {
    true
}
fn default_call_timeout() -> i64 {
    30
}
fn default_max_sockets() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_hung_session_check_interval")]
    pub hung_session_check_interval: i64,
    #[serde(default = "default_hung_session_no_tx_grace")]
    pub hung_session_no_tx_grace: i64,
    #[serde(default = "default_hung_session_max_active")]
    pub hung_session_max_active: i64,
    #[serde(default = "default_invoice_expiry")]
    pub invoice_expiry: i64,
}

fn default_hung_session_check_interval() -> i64 {
    1800
}
fn default_hung_session_no_tx_grace() -> i64 {
    600
}
fn default_hung_session_max_active() -> i64 {
    43_200
}
fn default_invoice_expiry() -> i64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    pub default_tariff_price_per_kwh: Decimal,
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_currency() -> String {
    "KZT".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub provider_kind: ProviderKind,
    pub provider_secret: String,
    pub provider_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "ServerConfig::default")]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default = "LoggingConfig::default")]
    pub logging: LoggingConfig,
    pub ocpp: OcppConfig,
    pub reconciler: ReconcilerConfig,
    pub tariff: TariffConfig,
    pub provider: ProviderConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_host: default_ws_host(),
            ws_port: default_ws_port(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Reads and validates the TOML file at `path`. Secrets may be
    /// overridden by environment variables so they never need to live on
    /// disk in a deployed environment.
    pub fn load(path: &Path) -> DomainResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DomainError::Internal(format!("reading config {}: {e}", path.display())))?;
        let mut cfg: AppConfig = toml::from_str(&raw)
            .map_err(|e| DomainError::Internal(format!("parsing config: {e}")))?;

        if let Ok(url) = std::env::var("EVCSMS_DATABASE_URL") {
            cfg.database.url = url;
        }
        if let Ok(secret) = std::env::var("EVCSMS_PROVIDER_SECRET") {
            cfg.provider.provider_secret = secret;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.ocpp.heartbeat_interval <= 0 {
            return Err(DomainError::InvalidArgument(
                "ocpp.heartbeat_interval must be positive".into(),
            ));
        }
        if self.reconciler.hung_session_no_tx_grace <= 0
            || self.reconciler.hung_session_max_active <= 0
        {
            return Err(DomainError::InvalidArgument(
                "reconciler grace/runaway windows must be positive".into(),
            ));
        }
        if self.provider.provider_secret.trim().is_empty() {
            return Err(DomainError::InvalidArgument(
                "provider.provider_secret must not be empty".into(),
            ));
        }
        if self.tariff.default_tariff_price_per_kwh <= Decimal::ZERO {
            return Err(DomainError::InvalidArgument(
                "tariff.default_tariff_price_per_kwh must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Heartbeat tolerance before a station is considered offline:
    /// `2 × interval + 30s` (spec.md §6).
    pub fn heartbeat_tolerance_secs(&self) -> i64 {
        2 * self.ocpp.heartbeat_interval + 30
    }
}

/// `~/.config/evcsms/config.toml`, mirroring the teacher's
/// `default_config_path()` convention.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evcsms")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
        [database]
        url = "sqlite://test.db?mode=rwc"

        [ocpp]
        heartbeat_interval = 300
        boot_accept = true
        call_timeout = 30
        max_sockets_per_process = 1000

        [reconciler]
        hung_session_check_interval = 1800
        hung_session_no_tx_grace = 600
        hung_session_max_active = 43200
        invoice_expiry = 300

        [tariff]
        default_tariff_price_per_kwh = "50.0"
        default_currency = "KZT"

        [provider]
        provider_kind = "provider-a"
        provider_secret = "shh"
        provider_base_url = "https://example.com"
        "#
    }

    #[test]
    fn loads_with_server_and_logging_defaults() {
        let cfg: AppConfig = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(cfg.server.ws_port, 9000);
        assert_eq!(cfg.server.api_port, 8080);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.heartbeat_tolerance_secs(), 2 * 300 + 30);
    }

    #[test]
    fn validate_rejects_empty_provider_secret() {
        let mut cfg: AppConfig = toml::from_str(minimal_toml()).unwrap();
        cfg.provider.provider_secret = "   ".to_owned();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_heartbeat_interval() {
        let mut cfg: AppConfig = toml::from_str(minimal_toml()).unwrap();
        cfg.ocpp.heartbeat_interval = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_tariff_price() {
        let mut cfg: AppConfig = toml::from_str(minimal_toml()).unwrap();
        cfg.tariff.default_tariff_price_per_kwh = Decimal::ZERO;
        assert!(cfg.validate().is_err());
    }
}
