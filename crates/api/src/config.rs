//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

use userhub_auth::TokenConfig;
use userhub_auth::token::{DEFAULT_TTL_HOURS, MAX_TTL_HOURS};
use userhub_observability::LogFormat;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_ADMIN_PASSWORD: &str = "passwordadmin";
const DEV_JWT_SECRET: &str = "userhub-insecure-development-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub token: TokenConfig,
    /// Password given to the seeded superadmin on first start.
    pub admin_password: String,
    pub bcrypt_cost: u32,
    pub log_format: LogFormat,
    /// True when `JWT_SECRET` was absent and the dev fallback is in use.
    pub insecure_secret: bool,
    #[cfg(feature = "postgres")]
    pub database_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("USERHUB_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "USERHUB_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let dev_mode = get("USERHUB_DEV")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let (secret, insecure_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None if dev_mode => (DEV_JWT_SECRET.to_string(), true),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let ttl_hours = match get("USERHUB_TOKEN_TTL_HOURS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: "USERHUB_TOKEN_TTL_HOURS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_TTL_HOURS,
        };
        if !(1..=MAX_TTL_HOURS).contains(&ttl_hours) {
            return Err(ConfigError::Invalid {
                key: "USERHUB_TOKEN_TTL_HOURS",
                reason: format!("must be between 1 and {MAX_TTL_HOURS}"),
            });
        }
        let ttl = Duration::try_hours(ttl_hours).ok_or(ConfigError::Invalid {
            key: "USERHUB_TOKEN_TTL_HOURS",
            reason: "out of range".to_string(),
        })?;

        let bcrypt_cost = match get("USERHUB_BCRYPT_COST") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "USERHUB_BCRYPT_COST",
                reason: e.to_string(),
            })?,
            None => bcrypt_default_cost(),
        };

        let log_format = match get("USERHUB_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| ConfigError::Invalid {
                key: "USERHUB_LOG_FORMAT",
                reason: e.to_string(),
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            token: TokenConfig::new(secret).with_ttl(ttl),
            admin_password: get("USERHUB_ADMIN_PASSWORD")
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
            bcrypt_cost,
            log_format,
            insecure_secret,
            #[cfg(feature = "postgres")]
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
        })
    }
}

fn bcrypt_default_cost() -> u32 {
    userhub_auth::CredentialVerifier::default().cost()
}
