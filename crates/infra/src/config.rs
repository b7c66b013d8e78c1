//! Process configuration.
//!
//! Sources, later ones winning: an optional `configuration.{toml,yaml,json}` file in the
//! working directory, then `COMPTA__*` environment variables (`.env` is loaded first).
//! `COMPTA__NUMBERING__TENANCY=global` sets `numbering.tenancy`.

use std::time::Duration;

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use compta_core::TenantId;
use compta_invoicing::{DEFAULT_VAT_RATE, DocumentType, NumberingScope, Tenancy};

use crate::numbering::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComptaConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub numbering: NumberingConfig,
    #[serde(default)]
    pub invoicing: InvoicingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Without a `url` the process keeps everything in memory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Whether every tenant has its own sequences or all tenants share one per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberingTenancy {
    #[default]
    PerTenant,
    Global,
}

impl NumberingTenancy {
    pub fn scope(&self, tenant_id: TenantId, document_type: DocumentType, year: i32) -> NumberingScope {
        let tenancy = match self {
            NumberingTenancy::PerTenant => Tenancy::Tenant(tenant_id),
            NumberingTenancy::Global => Tenancy::Global,
        };
        NumberingScope::new(document_type, year, tenancy)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumberingConfig {
    #[serde(default)]
    pub tenancy: NumberingTenancy,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl NumberingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvoicingConfig {
    /// Percent, applied when a request carries no rate.
    #[serde(default = "default_vat_rate")]
    pub default_vat_rate: Decimal,
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    10
}

fn default_max_delay_ms() -> u64 {
    200
}

fn default_vat_rate() -> Decimal {
    DEFAULT_VAT_RATE
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            tenancy: NumberingTenancy::default(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            default_vat_rate: default_vat_rate(),
        }
    }
}

impl Default for ComptaConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            numbering: NumberingConfig::default(),
            invoicing: InvoicingConfig::default(),
        }
    }
}

impl ComptaConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(
                Environment::with_prefix("COMPTA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let parsed: ComptaConfig = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.numbering.max_attempts == 0 {
            return Err(ConfigError::Invalid("numbering.max_attempts must be at least 1".into()));
        }
        if self.numbering.max_delay_ms < self.numbering.base_delay_ms {
            return Err(ConfigError::Invalid(
                "numbering.max_delay_ms must not be below numbering.base_delay_ms".into(),
            ));
        }
        if self.invoicing.default_vat_rate.is_sign_negative() {
            return Err(ConfigError::Invalid("invoicing.default_vat_rate must not be negative".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        Ok(())
    }
}
