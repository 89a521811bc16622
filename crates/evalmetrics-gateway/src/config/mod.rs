//! Process configuration loader (environment only).
//!
//! Read once at startup, then carried in `AppState`. Handlers never call
//! `std::env` themselves.

pub mod schema;

use std::time::Duration;

use evalmetrics_core::error::{EvalError, Result};

pub use schema::{
    AppConfig, DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS,
};

pub const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_PORT: &str = "PORT";
pub const ENV_MODEL: &str = "EVAL_MODEL";
pub const ENV_API_BASE: &str = "BIGQUERY_API_BASE";
pub const ENV_TIMEOUT_SECS: &str = "BIGQUERY_TIMEOUT_SECS";

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<AppConfig> {
    load_from_lookup(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary lookup (tests pass a map).
pub fn load_from_lookup<F>(lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    // An empty project cannot scope anything; treat it like an unset one.
    let project_id = read_optional(&lookup, ENV_PROJECT);
    let port = read_with_default(&lookup, ENV_PORT, DEFAULT_PORT)?;
    let model = read_optional(&lookup, ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let api_base =
        read_optional(&lookup, ENV_API_BASE).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let timeout_secs = read_with_default(&lookup, ENV_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS)?;

    let cfg = AppConfig {
        project_id,
        port,
        model,
        api_base,
        timeout: Duration::from_secs(timeout_secs),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn read_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn read_with_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .trim()
        .parse::<T>()
        .map_err(|_| EvalError::Config(format!("invalid value for {key}: {value}")))
}
