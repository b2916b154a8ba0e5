//! Configuration for water-billing-service.

use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Water billing service configuration.
#[derive(Debug, Clone)]
pub struct WaterBillingConfig {
    pub common: CoreConfig,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub billing: BillingSettings,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Billing-cycle settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingSettings {
    /// Prior bills loaded for debt aging.
    pub aging_window: i64,
    /// Default when a request does not say whether to carry the balance.
    pub carry_balance: bool,
    /// Meters billed concurrently during a batch run.
    pub batch_concurrency: usize,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            aging_window: 12,
            carry_balance: true,
            batch_concurrency: 4,
        }
    }
}

impl BillingSettings {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let settings = Self {
            aging_window: parse_env("BILLING_AGING_WINDOW", defaults.aging_window)?,
            carry_balance: parse_env("BILLING_CARRY_BALANCE", defaults.carry_balance)?,
            batch_concurrency: parse_env("BILLING_BATCH_CONCURRENCY", defaults.batch_concurrency)?,
        };

        if settings.aging_window < 1 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BILLING_AGING_WINDOW must be at least 1"
            )));
        }
        Ok(settings)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

impl WaterBillingConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        let common = CoreConfig::load()?;

        let service_name =
            env::var("SERVICE_NAME").unwrap_or_else(|_| "water-billing-service".to_string());
        let service_version =
            env::var("SERVICE_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let otlp_endpoint = env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty());

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("DATABASE_URL must be set"))
            })?,
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 2)?,
        };

        Ok(Self {
            common,
            service_name,
            service_version,
            log_level,
            otlp_endpoint,
            database,
            billing: BillingSettings::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_defaults() {
        let settings = BillingSettings::default();
        assert_eq!(settings.aging_window, 12);
        assert!(settings.carry_balance);
    }

    #[test]
    fn unset_variable_takes_default() {
        let value: u32 = parse_env("WATER_BILLING_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
