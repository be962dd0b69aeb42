// Application configuration
// Read from the environment (after .env is loaded), with defaults for
// everything but the database URL.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::allocation::{EngineSettings, PricingConfig, SegmentStrategy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub pricing: PricingConfig,
    pub segment_strategy: SegmentStrategy,
    pub cache_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let db_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                value: db_max_connections.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8080u16)?;

        let defaults = PricingConfig::default();
        let tax_factor: Decimal = parse_or(&lookup, "PRICING_TAX_FACTOR", defaults.tax_factor)?;
        if tax_factor <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                name: "PRICING_TAX_FACTOR",
                value: tax_factor.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let pricing = PricingConfig {
            reference_channel: lookup("PRICING_REFERENCE_CHANNEL").unwrap_or(defaults.reference_channel),
            local_currency: lookup("PRICING_LOCAL_CURRENCY").unwrap_or(defaults.local_currency),
            tax_factor,
        };

        let segment_strategy = parse_or(&lookup, "ALLOCATION_SEGMENT_STRATEGY", SegmentStrategy::default())?;
        let cache_ttl = Duration::from_secs(parse_or(&lookup, "STORE_CACHE_TTL_SECS", 60u64)?);

        Ok(Self {
            database_url,
            db_max_connections,
            host,
            port,
            pricing,
            segment_strategy,
            cache_ttl,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pricing: self.pricing.clone(),
            segment_strategy: self.segment_strategy,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}
