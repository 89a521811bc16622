//! Metrics endpoint.
//!
//! acquire client -> submit query -> read every row -> respond -> release.
//!
//! The report is buffered in full before any byte is sent. A failure at any
//! stage, including after some rows were read, yields the same opaque 500.

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use tracing::{error, info, instrument};

use evalmetrics_core::error::{EvalError, Result};
use evalmetrics_core::Report;

use crate::app_state::AppState;
use crate::config::ENV_PROJECT;

/// Body sent for every failure. Error detail stays in the logs.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

#[instrument(name = "metrics_request", skip_all, fields(method = %method, uri = %uri))]
pub async fn metrics_report(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    match collect_report(&state).await {
        Ok(report) => {
            info!(rows = report.rows(), "metrics report served");
            (StatusCode::OK, report.into_body()).into_response()
        }
        Err(e) => {
            error!(code = e.client_code().as_str(), error = %e, "metrics request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response()
        }
    }
}

/// Run the fixed query and format every row.
///
/// The client lives for the duration of this call and is dropped on every
/// return path.
pub async fn collect_report(state: &AppState) -> Result<Report> {
    let project = state
        .cfg()
        .project_id()
        .ok_or_else(|| EvalError::Client(format!("{ENV_PROJECT} is not set")))?;

    let client = state.warehouse().connect(project).await?;
    let mut rows = client.submit(state.query()).await?;

    let mut report = Report::new();
    while let Some(row) = rows.try_next().await? {
        report.push(&row);
    }
    Ok(report)
}
