//! BigQuery REST client against an in-process fake of the v2 query endpoints.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::{json, Value};

use evalmetrics_core::error::{EvalError, Result};
use evalmetrics_gateway::warehouse::{BigQueryWarehouse, TokenSource, Warehouse};

const SQL: &str = "SELECT * FROM ML.EVALUATE(MODEL final434.imdbmodel.logistic_reg_classifier)";

struct StaticToken(&'static str);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct NoCredentials;

#[async_trait]
impl TokenSource for NoCredentials {
    async fn token(&self) -> Result<String> {
        Err(EvalError::Client("could not find default credentials".into()))
    }
}

#[derive(Default)]
struct Recorder {
    posts: AtomicUsize,
    gets: AtomicUsize,
    auth: Mutex<Vec<String>>,
    bodies: Mutex<Vec<Value>>,
    params: Mutex<Vec<HashMap<String, String>>>,
}

fn schema() -> Value {
    // Deliberately not in struct order.
    json!({"fields": [
        {"name": "roc_auc", "type": "FLOAT"},
        {"name": "log_loss", "type": "FLOAT"},
        {"name": "f1_score", "type": "FLOAT"},
        {"name": "accuracy", "type": "FLOAT"},
        {"name": "recall", "type": "FLOAT"},
        {"name": "precision", "type": "FLOAT"}
    ]})
}

fn cells(precision: &str) -> Value {
    json!({"f": [
        {"v": "0.93"}, {"v": "0.34"}, {"v": "0.859"},
        {"v": "0.858"}, {"v": "0.86"}, {"v": precision}
    ]})
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {
            "code": status.as_u16(),
            "message": message,
            "status": "INVALID_ARGUMENT"
        }})),
    )
        .into_response()
}

async fn fake_query(
    State(rec): State<Arc<Recorder>>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    rec.posts.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let server_wait = body["timeoutMs"].as_u64().unwrap_or_default();
    rec.auth.lock().unwrap().push(auth.clone());
    rec.bodies.lock().unwrap().push(body);

    if auth != "Bearer test-token" {
        return api_error(
            StatusCode::UNAUTHORIZED,
            "Request had invalid authentication credentials.",
        );
    }

    let job = json!({"projectId": project, "jobId": "job_1", "location": "US"});
    match project.as_str() {
        "paged" | "badpage" => {
            let token = if project == "paged" { "p2" } else { "bad" };
            Json(json!({
                "jobComplete": true,
                "jobReference": job,
                "schema": schema(),
                "rows": [cells("0.1"), cells("0.2")],
                "pageToken": token,
                "totalRows": "3"
            }))
            .into_response()
        }
        "single" => Json(json!({
            "jobComplete": true,
            "jobReference": job,
            "schema": schema(),
            "rows": [cells("0.85")],
            "totalRows": "1"
        }))
        .into_response(),
        "empty" => Json(json!({
            "jobComplete": true,
            "jobReference": job,
            "schema": schema(),
            "totalRows": "0"
        }))
        .into_response(),
        "slow" | "never" => {
            Json(json!({"jobComplete": false, "jobReference": job})).into_response()
        }
        "held" => {
            // Like the real service: hold the call for the requested wait.
            tokio::time::sleep(Duration::from_millis(server_wait)).await;
            Json(json!({"jobComplete": false, "jobReference": job})).into_response()
        }
        "garbled" => Json(json!({
            "jobComplete": true,
            "jobReference": job,
            "schema": schema(),
            "rows": [cells("not-a-number")]
        }))
        .into_response(),
        _ => api_error(
            StatusCode::BAD_REQUEST,
            "Not found: Model final434:imdbmodel.logistic_reg_classifier",
        ),
    }
}

async fn fake_results(
    State(rec): State<Arc<Recorder>>,
    Path((project, job_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    rec.gets.fetch_add(1, Ordering::SeqCst);
    rec.params.lock().unwrap().push(params.clone());
    assert_eq!(job_id, "job_1");

    match (project.as_str(), params.get("pageToken").map(String::as_str)) {
        ("paged", Some("p2")) => Json(json!({
            "jobComplete": true,
            "schema": schema(),
            "rows": [cells("0.3")]
        }))
        .into_response(),
        ("badpage", Some(_)) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "backend error"),
        ("never", None) => Json(json!({"jobComplete": false})).into_response(),
        ("slow" | "held", None) => Json(json!({
            "jobComplete": true,
            "schema": schema(),
            "rows": [cells("0.7")]
        }))
        .into_response(),
        _ => api_error(StatusCode::NOT_FOUND, "unknown job"),
    }
}

async fn spawn_fake() -> (String, Arc<Recorder>) {
    let rec = Arc::new(Recorder::default());
    let app = Router::new()
        .route("/bigquery/v2/projects/:project/queries", post(fake_query))
        .route("/bigquery/v2/projects/:project/queries/:job", get(fake_results))
        .with_state(Arc::clone(&rec));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/bigquery/v2"), rec)
}

fn warehouse(base: &str, credentials: Arc<dyn TokenSource>) -> BigQueryWarehouse {
    warehouse_with_timeout(base, credentials, Duration::from_secs(5))
}

fn warehouse_with_timeout(
    base: &str,
    credentials: Arc<dyn TokenSource>,
    timeout: Duration,
) -> BigQueryWarehouse {
    BigQueryWarehouse::with_credentials(base, timeout, credentials).unwrap()
}

#[tokio::test]
async fn single_page_query() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("single").await.unwrap();
    let rows: Vec<_> = client.submit(SQL).await.unwrap().try_collect().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].precision, 0.85);
    assert_eq!(rows[0].recall, 0.86);
    assert_eq!(rows[0].roc_auc, 0.93);
    assert_eq!(rows[0].row, 0);

    let body = rec.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["query"], SQL);
    assert_eq!(body["useLegacySql"], false);
    // server-side wait is half the 5s HTTP timeout
    assert_eq!(body["timeoutMs"], 2500);
    assert_eq!(rec.auth.lock().unwrap()[0], "Bearer test-token");
    assert_eq!(rec.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_result_yields_no_rows() {
    let (base, _) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("empty").await.unwrap();
    let rows: Vec<_> = client.submit(SQL).await.unwrap().try_collect().await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn later_pages_are_fetched_lazily() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("paged").await.unwrap();
    let mut rows = client.submit(SQL).await.unwrap();

    let first = rows.next().await.unwrap().unwrap();
    let second = rows.next().await.unwrap().unwrap();
    assert_eq!((first.precision, second.precision), (0.1, 0.2));
    assert_eq!(rec.gets.load(Ordering::SeqCst), 0);

    let third = rows.next().await.unwrap().unwrap();
    assert_eq!(third.precision, 0.3);
    assert_eq!(third.row, 2);
    assert!(rows.next().await.is_none());
    assert_eq!(rec.gets.load(Ordering::SeqCst), 1);

    let params = rec.params.lock().unwrap()[0].clone();
    assert_eq!(params.get("pageToken").map(String::as_str), Some("p2"));
    assert_eq!(params.get("location").map(String::as_str), Some("US"));
}

#[tokio::test]
async fn incomplete_job_is_polled() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("slow").await.unwrap();
    let rows: Vec<_> = client.submit(SQL).await.unwrap().try_collect().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].precision, 0.7);
    assert_eq!(rec.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn query_held_for_server_wait_is_still_polled() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse_with_timeout(
        &base,
        Arc::new(StaticToken("test-token")),
        Duration::from_secs(2),
    );

    let client = wh.connect("held").await.unwrap();
    let rows: Vec<_> = client.submit(SQL).await.unwrap().try_collect().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].precision, 0.7);

    assert_eq!(rec.bodies.lock().unwrap()[0]["timeoutMs"], 1000);
    assert_eq!(rec.gets.load(Ordering::SeqCst), 1);
    let params = rec.params.lock().unwrap()[0].clone();
    assert_eq!(params.get("timeoutMs").map(String::as_str), Some("1000"));
}

#[tokio::test]
async fn server_wait_is_capped() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse_with_timeout(
        &base,
        Arc::new(StaticToken("test-token")),
        Duration::from_secs(300),
    );

    let client = wh.connect("single").await.unwrap();
    let _ = client.submit(SQL).await.unwrap();
    assert_eq!(rec.bodies.lock().unwrap()[0]["timeoutMs"], 10_000);
}

#[tokio::test]
async fn job_that_never_completes_hits_the_deadline() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse_with_timeout(
        &base,
        Arc::new(StaticToken("test-token")),
        Duration::from_secs(1),
    );

    let client = wh.connect("never").await.unwrap();
    let err = client.submit(SQL).await.err().expect("must fail");
    assert_eq!(err.client_code().as_str(), "QUERY_FAILED");
    assert!(err.to_string().contains("did not complete"));

    // polls are spaced out, not back-to-back
    let gets = rec.gets.load(Ordering::SeqCst);
    assert!((1..=5).contains(&gets), "gets = {gets}");
}

#[tokio::test]
async fn rejected_query_is_query_error() {
    let (base, _) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("missing-model").await.unwrap();
    let err = client.submit(SQL).await.err().expect("must fail");
    assert_eq!(err.client_code().as_str(), "QUERY_FAILED");
    assert!(err.to_string().contains("Not found: Model"));
}

#[tokio::test]
async fn bad_token_is_query_error() {
    let (base, _) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("stale")));

    let client = wh.connect("single").await.unwrap();
    let err = client.submit(SQL).await.err().expect("must fail");
    assert_eq!(err.client_code().as_str(), "QUERY_FAILED");
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn missing_credentials_fail_at_connect() {
    let (base, rec) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(NoCredentials));

    let err = wh.connect("single").await.err().expect("must fail");
    assert_eq!(err.client_code().as_str(), "CLIENT_UNAVAILABLE");
    assert_eq!(rec.posts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn page_failure_surfaces_after_earlier_rows() {
    let (base, _) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("badpage").await.unwrap();
    let results: Vec<Result<_>> = client.submit(SQL).await.unwrap().collect().await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    let err = results[2].as_ref().err().expect("third item is the page error");
    assert_eq!(err.client_code().as_str(), "ROW_FAILED");
}

#[tokio::test]
async fn undecodable_cell_is_row_error() {
    let (base, _) = spawn_fake().await;
    let wh = warehouse(&base, Arc::new(StaticToken("test-token")));

    let client = wh.connect("garbled").await.unwrap();
    let err = client
        .submit(SQL)
        .await
        .unwrap()
        .try_collect::<Vec<_>>()
        .await
        .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "ROW_FAILED");
}

#[tokio::test]
async fn unreachable_service_is_query_error() {
    // Nothing listens on port 9 locally.
    let wh = warehouse("http://127.0.0.1:9/bigquery/v2", Arc::new(StaticToken("test-token")));
    let client = wh.connect("single").await.unwrap();
    let err = client.submit(SQL).await.err().expect("must fail");
    assert_eq!(err.client_code().as_str(), "QUERY_FAILED");
}

#[test]
fn invalid_api_base_is_config_error() {
    let err = BigQueryWarehouse::with_credentials(
        "not a url",
        Duration::from_secs(5),
        Arc::new(StaticToken("t")),
    )
    .err()
    .expect("must fail");
    assert_eq!(err.client_code().as_str(), "CONFIG");
}
