use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use evalmetrics_core::error::{EvalError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL: &str = "final434.imdbmodel.logistic_reg_classifier";
pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Billing/query scope. `None` is allowed at startup; every request then
    /// fails at client acquisition.
    pub project_id: Option<String>,
    pub port: u16,
    /// Fully qualified model reference (`dataset.model` or
    /// `project.dataset.model`).
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(EvalError::Config(
                "BIGQUERY_TIMEOUT_SECS must be greater than 0".into(),
            ));
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(EvalError::Config(format!(
                "BIGQUERY_API_BASE must be an http(s) URL: {}",
                self.api_base
            )));
        }
        Ok(())
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Bind on every interface at the configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// The one query this service ever runs.
    pub fn query(&self) -> String {
        format!("SELECT * FROM ML.EVALUATE(MODEL {})", self.model)
    }
}
