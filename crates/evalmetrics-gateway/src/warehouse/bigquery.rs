//! BigQuery client over the REST v2 API.
//!
//! - `connect`: obtain a bearer token for the project (client acquisition)
//! - `submit`: `jobs.query`, polling `jobs.getQueryResults` until the job is done
//! - row stream: first page from `jobs.query`, later pages fetched on demand
//!
//! No retries. Every failure is returned to the caller as-is.
//!
//! The server-side wait (`timeoutMs`) is kept below the HTTP timeout so the
//! service answers `jobComplete: false` before reqwest gives up. One deadline
//! of `timeout` bounds submission plus polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt, TryStreamExt};
use reqwest::{Client, RequestBuilder, Url};
use tracing::{debug, instrument};

use evalmetrics_core::error::{EvalError, Result};
use evalmetrics_core::MetricsRow;

use crate::config::AppConfig;
use crate::warehouse::auth::{AmbientCredentials, TokenSource};
use crate::warehouse::wire::{
    decode_rows, ErrorEnvelope, JobReference, QueryRequest, QueryResponse, TableRow,
    TableSchema,
};
use crate::warehouse::{RowStream, Warehouse, WarehouseClient};

/// Upper bound on how long one `jobs.query` / `getQueryResults` call may be
/// held open by the service.
const MAX_SERVER_WAIT: Duration = Duration::from_secs(10);

/// Pause between `getQueryResults` polls while the job is still running.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Shared, long-lived part: HTTP connection pool and credential source.
pub struct BigQueryWarehouse {
    http: Client,
    api_base: Url,
    timeout: Duration,
    credentials: Arc<dyn TokenSource>,
}

impl BigQueryWarehouse {
    /// Build a warehouse using ambient cloud credentials.
    pub fn new(cfg: &AppConfig) -> Result<Self> {
        Self::with_credentials(&cfg.api_base, cfg.timeout, Arc::new(AmbientCredentials::new()))
    }

    pub fn with_credentials(
        api_base: &str,
        timeout: Duration,
        credentials: Arc<dyn TokenSource>,
    ) -> Result<Self> {
        let api_base = Url::parse(api_base).map_err(|e| {
            EvalError::Config(format!("invalid BigQuery API base {api_base:?}: {e}"))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(EvalError::Config(format!(
                "BigQuery API base cannot carry a path: {api_base}"
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvalError::Config(format!("build http client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            timeout,
            credentials,
        })
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    #[instrument(skip(self))]
    async fn connect(&self, project_id: &str) -> Result<Box<dyn WarehouseClient>> {
        let token = self.credentials.token().await?;
        debug!("warehouse client acquired");
        Ok(Box::new(BigQueryClient {
            conn: Arc::new(Connection {
                http: self.http.clone(),
                api_base: self.api_base.clone(),
                project_id: project_id.to_string(),
                token,
                timeout: self.timeout,
            }),
        }))
    }
}

/// Per-request client. Dropping it releases the token; pages still being
/// read hold their own reference to the connection.
pub struct BigQueryClient {
    conn: Arc<Connection>,
}

impl Drop for BigQueryClient {
    fn drop(&mut self) {
        debug!(project = %self.conn.project_id, "warehouse client released");
    }
}

struct Connection {
    http: Client,
    api_base: Url,
    project_id: String,
    token: String,
    timeout: Duration,
}

impl Connection {
    /// `{base}/projects/{project}/queries[/{job_id}]`
    fn queries_url(&self, job_id: Option<&str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| EvalError::Internal("api base cannot be a base".into()))?;
            segs.pop_if_empty().extend(["projects", self.project_id.as_str(), "queries"]);
            if let Some(job_id) = job_id {
                segs.push(job_id);
            }
        }
        Ok(url)
    }

    /// Half the HTTP timeout, capped at `MAX_SERVER_WAIT`.
    fn server_wait_ms(&self) -> u64 {
        let wait = (self.timeout / 2).min(MAX_SERVER_WAIT);
        u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResponse> {
        let url = self.queries_url(None)?;
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.server_wait_ms(),
        };
        self.call(self.http.post(url).json(&body), EvalError::Query).await
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        stage: fn(String) -> EvalError,
    ) -> Result<QueryResponse> {
        let url = self.queries_url(Some(&job.job_id)).map_err(|e| stage(e.to_string()))?;
        let mut req = self
            .http
            .get(url)
            .query(&[("timeoutMs", self.server_wait_ms().to_string())]);
        if let Some(location) = job.location.as_deref() {
            req = req.query(&[("location", location)]);
        }
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }
        self.call(req, stage).await
    }

    /// Send with auth, map transport/status/body failures through `stage`.
    async fn call(
        &self,
        req: RequestBuilder,
        stage: fn(String) -> EvalError,
    ) -> Result<QueryResponse> {
        let response = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| stage(format!("request failed: {e}")))?;

        let status = response.status();
        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| stage(format!("read response body: {e}")))?;

        if !status.is_success() {
            let detail = match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(env) => format!(
                    "{} {}: {}",
                    env.error.code, env.error.status, env.error.message
                ),
                Err(_) => String::from_utf8_lossy(&body).into_owned(),
            };
            return Err(stage(format!("status {status}: {detail}")));
        }

        serde_json::from_slice(&body).map_err(|e| stage(format!("decode response: {e}")))
    }

    /// Poll until the job reports completion. The caller bounds the wait.
    async fn wait_for_completion(&self, first: QueryResponse) -> Result<QueryResponse> {
        if first.job_complete {
            return Ok(first);
        }
        let job = first
            .job_reference
            .clone()
            .ok_or_else(|| EvalError::Query("incomplete query without job reference".into()))?;

        loop {
            debug!(job_id = %job.job_id, "query still running");
            tokio::time::sleep(POLL_INTERVAL).await;
            let mut resp = self.query_results(&job, None, EvalError::Query).await?;
            if resp.job_complete {
                resp.job_reference.get_or_insert_with(|| job.clone());
                return Ok(resp);
            }
        }
    }

    /// `jobs.query` plus polling, under a single deadline.
    async fn complete_query(&self, sql: &str) -> Result<QueryResponse> {
        let run = async {
            let first = self.run_query(sql).await?;
            self.wait_for_completion(first).await
        };
        tokio::time::timeout(self.timeout, run).await.map_err(|_| {
            EvalError::Query(format!("query did not complete within {:?}", self.timeout))
        })?
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    #[instrument(skip(self, sql), fields(project = %self.conn.project_id))]
    async fn submit(&self, sql: &str) -> Result<RowStream> {
        let first = self.conn.complete_query(sql).await?;

        let columns = first
            .schema
            .as_ref()
            .map(TableSchema::column_names)
            .unwrap_or_default();

        debug!(
            columns = columns.len(),
            first_page = first.rows.len(),
            more = first.page_token.is_some(),
            "query complete"
        );

        let pager = Pager {
            conn: Arc::clone(&self.conn),
            job: first.job_reference,
            columns,
            pending: Some(first.rows),
            next_token: first.page_token,
            offset: 0,
        };
        Ok(pager.into_stream())
    }
}

/// Lazy page walker. Only the page in hand is held in memory.
struct Pager {
    conn: Arc<Connection>,
    job: Option<JobReference>,
    columns: Vec<String>,
    pending: Option<Vec<TableRow>>,
    next_token: Option<String>,
    offset: u64,
}

impl Pager {
    async fn next_page(&mut self) -> Result<Option<Vec<TableRow>>> {
        if let Some(rows) = self.pending.take() {
            return Ok(Some(rows));
        }
        let Some(token) = self.next_token.take() else {
            return Ok(None);
        };
        let job = self
            .job
            .as_ref()
            .ok_or_else(|| EvalError::Row("page token without job reference".into()))?;

        let page = self.conn.query_results(job, Some(&token), EvalError::Row).await?;
        self.next_token = page.page_token;
        Ok(Some(page.rows))
    }

    async fn step(mut self) -> Result<Option<(Vec<MetricsRow>, Self)>> {
        let Some(rows) = self.next_page().await? else {
            return Ok(None);
        };
        let decoded = decode_rows(&self.columns, &rows, self.offset)?;
        self.offset += rows.len() as u64;
        Ok(Some((decoded, self)))
    }

    fn into_stream(self) -> RowStream {
        stream::try_unfold(self, Pager::step)
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<_, EvalError>)))
            .try_flatten()
            .boxed()
    }
}
