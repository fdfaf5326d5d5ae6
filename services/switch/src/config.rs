use std::time::Duration;

use crate::domain::types::{DEFAULT_CODE_TTL_SECS, MAX_CODE_TTL_SECS};

/// Configuration problems detected at startup. Any of these is fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Outbound mail settings. Credentials are mandatory.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    /// SMTP submission port (default 587, STARTTLS). Env var: `SMTP_PORT`.
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    /// Sender mailbox, e.g. `Blackout <noreply@example.com>`. Env var: `MAIL_FROM`.
    pub from: String,
}

/// Switch service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SwitchConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// TCP port to listen on (default 3114). Env var: `SWITCH_PORT`.
    pub switch_port: u16,
    /// Address that receives block-activation codes. Env var: `BLOCK_ADMIN_EMAIL`.
    pub block_admin_email: String,
    /// One-time code lifetime (default 600s, at most one day). Env var: `CODE_TTL_SECS`.
    pub code_ttl: chrono::Duration,
    /// Upper bound for one delivery attempt (default 10s). Env var: `DISPATCH_TIMEOUT_SECS`.
    pub dispatch_timeout: Duration,
    /// Delivery attempts before giving up (default 2). Env var: `DISPATCH_MAX_ATTEMPTS`.
    pub dispatch_max_attempts: u32,
    pub mail: MailConfig,
}

impl SwitchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let code_ttl_secs: i64 = parse_or(&lookup, "CODE_TTL_SECS", DEFAULT_CODE_TTL_SECS)?;
        let code_ttl = Some(code_ttl_secs)
            .filter(|secs| (1..=MAX_CODE_TTL_SECS).contains(secs))
            .and_then(chrono::TimeDelta::try_seconds)
            .ok_or_else(|| ConfigError::Invalid {
                name: "CODE_TTL_SECS",
                value: code_ttl_secs.to_string(),
            })?;
        let dispatch_timeout_secs: u64 = parse_or(&lookup, "DISPATCH_TIMEOUT_SECS", 10)?;
        if dispatch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "DISPATCH_TIMEOUT_SECS",
                value: "0".to_owned(),
            });
        }
        let dispatch_max_attempts: u32 = parse_or(&lookup, "DISPATCH_MAX_ATTEMPTS", 2)?;
        if dispatch_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "DISPATCH_MAX_ATTEMPTS",
                value: "0".to_owned(),
            });
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            switch_port: parse_or(&lookup, "SWITCH_PORT", 3114)?,
            block_admin_email: required("BLOCK_ADMIN_EMAIL")?,
            code_ttl,
            dispatch_timeout: Duration::from_secs(dispatch_timeout_secs),
            dispatch_max_attempts,
            mail: MailConfig {
                smtp_host: required("SMTP_HOST")?,
                smtp_port: parse_or(&lookup, "SMTP_PORT", 587)?,
                smtp_username: required("SMTP_USERNAME")?,
                smtp_password: required("SMTP_PASSWORD")?,
                from: required("MAIL_FROM")?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
