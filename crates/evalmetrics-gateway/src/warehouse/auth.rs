//! Ambient cloud credentials.
//!
//! Credentials come from the environment the process runs in (Application
//! Default Credentials, gcloud user credentials, or the metadata server on
//! Cloud Run). The provider is resolved on first use, not at boot, so a
//! process without credentials still starts and reports the failure per
//! request.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use evalmetrics_core::error::{EvalError, Result};

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Source of bearer tokens for the warehouse API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

#[derive(Default)]
pub struct AmbientCredentials {
    provider: OnceCell<Arc<dyn gcp_auth::TokenProvider>>,
}

impl AmbientCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenSource for AmbientCredentials {
    async fn token(&self) -> Result<String> {
        // A failed lookup is not cached; the next request tries again.
        let provider = self
            .provider
            .get_or_try_init(gcp_auth::provider)
            .await
            .map_err(|e| EvalError::Client(format!("resolve credentials: {e}")))?;

        let token = provider
            .token(&[BIGQUERY_SCOPE])
            .await
            .map_err(|e| EvalError::Client(format!("fetch access token: {e}")))?;

        Ok(token.as_str().to_string())
    }
}
