//! BigQuery REST v2 payloads (`jobs.query` / `jobs.getQueryResults`).
//!
//! Only the fields this service reads are modelled. Row cells arrive as
//! `{"v": "<string>"}` and are matched to schema field names by position.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use evalmetrics_core::error::{EvalError, Result};
use evalmetrics_core::row::COLUMNS;
use evalmetrics_core::MetricsRow;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    pub query: &'a str,
    pub use_legacy_sql: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default = "job_complete_default")]
    pub job_complete: bool,
}

fn job_complete_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

/// Google API error body: `{"error": {"code": .., "message": .., "status": ..}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Decode one page of rows. `offset` is the position of the first row in the
/// whole result; it stands in for `row` when the model output has no such
/// column.
pub fn decode_rows(columns: &[String], rows: &[TableRow], offset: u64) -> Result<Vec<MetricsRow>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| decode_row(columns, row, offset + i as u64))
        .collect()
}

fn decode_row(columns: &[String], row: &TableRow, position: u64) -> Result<MetricsRow> {
    if row.f.len() != columns.len() {
        return Err(EvalError::Row(format!(
            "row {position}: {} cells for {} schema fields",
            row.f.len(),
            columns.len()
        )));
    }

    let mut obj = Map::new();
    for (name, cell) in columns.iter().zip(&row.f) {
        if !COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let value = coerce(name, &cell.v)
            .map_err(|msg| EvalError::Row(format!("row {position}: {msg}")))?;
        obj.insert(name.clone(), value);
    }
    obj.entry("row").or_insert_with(|| Value::from(position));

    serde_json::from_value(Value::Object(obj))
        .map_err(|e| EvalError::Row(format!("row {position}: {e}")))
}

/// INT64 and FLOAT64 cells are JSON strings on the wire.
fn coerce(name: &str, v: &Value) -> std::result::Result<Value, String> {
    match v {
        Value::String(s) if name == "row" => s
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("column {name}: not an integer: {s:?}")),
        Value::String(s) => {
            let f = s
                .parse::<f64>()
                .map_err(|_| format!("column {name}: not a number: {s:?}"))?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("column {name}: non-finite value {s:?}"))
        }
        Value::Number(_) | Value::Null => Ok(v.clone()),
        other => Err(format!("column {name}: unexpected cell {other}")),
    }
}
