//! Data-warehouse seam.
//!
//! The endpoint only needs "connect to a project, submit SQL, read typed rows
//! lazily". `Warehouse` hands out one `WarehouseClient` per request; dropping
//! the client releases it.

pub mod auth;
pub mod bigquery;
pub mod wire;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use evalmetrics_core::error::Result;
use evalmetrics_core::MetricsRow;

pub use auth::{AmbientCredentials, TokenSource};
pub use bigquery::BigQueryWarehouse;

/// Single-pass row sequence. Re-reading requires a fresh `submit`.
pub type RowStream = BoxStream<'static, Result<MetricsRow>>;

/// Factory for per-request clients.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Acquire a client scoped to `project_id`.
    /// Failures must surface as `EvalError::Client`.
    async fn connect(&self, project_id: &str) -> Result<Box<dyn WarehouseClient>>;
}

#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Submit `sql` and return its rows.
    /// Submission failures surface as `EvalError::Query`; failures while the
    /// stream is consumed surface as `EvalError::Row`.
    async fn submit(&self, sql: &str) -> Result<RowStream>;
}
