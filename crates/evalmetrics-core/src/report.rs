//! Plain-text report served by the metrics endpoint.
//!
//! The layout is meant for humans. Labels are newline separated, and there is
//! no framing a machine could rely on.

use std::fmt::Write;

use crate::row::MetricsRow;

/// First line of every successful response.
pub const HEADER: &str = "Model performance:\n";

/// Append one row block to `out`.
pub fn write_block(out: &mut String, row: &MetricsRow) {
    let _ = writeln!(
        out,
        "Precision: {}\nRecall: {}\nAccuracy: {}\nF1_score: {}, Log_loss: {}\nROC AUC: {}",
        row.precision, row.recall, row.accuracy, row.f1_score, row.log_loss, row.roc_auc
    );
}

/// Buffered report. Nothing reaches the caller until the whole result set
/// has been read, so a failed iteration never leaves a truncated body.
#[derive(Debug)]
pub struct Report {
    body: String,
    rows: usize,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            body: HEADER.to_string(),
            rows: 0,
        }
    }

    pub fn push(&mut self, row: &MetricsRow) {
        write_block(&mut self.body, row);
        self.rows += 1;
    }

    /// Number of row blocks written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_body(self) -> String {
        self.body
    }
}
