//! Configuration loader for the `hydro-rollup` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Nothing else in the crate reads `env::var` for
//! service settings.
//!
use std::env;
use std::net::SocketAddr;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean environment variable with a default value.
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name).ok().as_deref() {
            None => $default,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => return Err(anyhow!("Invalid {}: '{}'", $var_name, other)),
        }
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP listen address.
    pub bind_addr: SocketAddr,

    /// Whether the monthly rollup timer runs in this process.
    pub scheduler_enabled: bool,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `ROLLUP_SCHEDULER_ENABLED` – run the monthly rollup timer (default: true)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bind_addr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?;
    let scheduler_enabled = parse_env_bool!("ROLLUP_SCHEDULER_ENABLED", true);

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        scheduler_enabled,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all other values.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL             : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX              : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR                : {}", self.bind_addr);
        tracing::info!("  ROLLUP_SCHEDULER_ENABLED : {}", self.scheduler_enabled);
    }

    /// Database URL with the password replaced by `****`.
    pub fn masked_db_url(&self) -> String {
        // ---
        let Some(at_pos) = self.db_url.rfind('@') else {
            return self.db_url.clone();
        };
        let userinfo = &self.db_url[..at_pos];
        // Skip the "scheme://" colon when looking for the password separator
        let scheme_end = userinfo.find("://").map_or(0, |p| p + 3);
        match userinfo[scheme_end..].find(':') {
            Some(colon) => format!(
                "{}:****{}",
                &self.db_url[..scheme_end + colon],
                &self.db_url[at_pos..]
            ),
            None => self.db_url.clone(),
        }
    }
}
