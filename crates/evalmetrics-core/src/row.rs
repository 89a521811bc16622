//! Metrics row (one line of an `ML.EVALUATE` result set).

use serde::Deserialize;

/// Result column names, in report order after `row`.
pub const COLUMNS: [&str; 7] = [
    "row",
    "precision",
    "recall",
    "accuracy",
    "f1_score",
    "log_loss",
    "roc_auc",
];

/// One row of model-evaluation statistics.
///
/// Fields decode by result column name, so the column order of the query
/// result does not matter. Every metric column must be present and non-null;
/// extra columns are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MetricsRow {
    pub row: i64,
    pub precision: f64,
    pub recall: f64,
    pub accuracy: f64,
    pub f1_score: f64,
    pub log_loss: f64,
    pub roc_auc: f64,
}
