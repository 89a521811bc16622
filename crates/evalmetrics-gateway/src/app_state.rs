//! Shared application state for the metrics gateway.
//!
//! Holds the configuration read at startup and the warehouse used to open a
//! client per request. Nothing in here is mutated after boot.

use std::sync::Arc;

use evalmetrics_core::error::Result;

use crate::config::AppConfig;
use crate::warehouse::{BigQueryWarehouse, Warehouse};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: AppConfig,
    query: String,
    warehouse: Arc<dyn Warehouse>,
}

impl AppState {
    /// Build state backed by BigQuery with ambient credentials.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: AppConfig) -> Result<Self> {
        let warehouse = Arc::new(BigQueryWarehouse::new(&cfg)?);
        Ok(Self::with_warehouse(cfg, warehouse))
    }

    pub fn with_warehouse(cfg: AppConfig, warehouse: Arc<dyn Warehouse>) -> Self {
        let query = cfg.query();
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                query,
                warehouse,
            }),
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.inner.cfg
    }

    /// The fixed query, built once from config.
    pub fn query(&self) -> &str {
        &self.inner.query
    }

    pub fn warehouse(&self) -> Arc<dyn Warehouse> {
        Arc::clone(&self.inner.warehouse)
    }
}
