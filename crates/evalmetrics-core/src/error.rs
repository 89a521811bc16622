//! Shared error type across evalmetrics crates.

use thiserror::Error;

/// Stable error codes for logs and tests. Never rendered to HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Bad process configuration.
    Config,
    /// Could not obtain a warehouse client.
    ClientUnavailable,
    /// The warehouse rejected or failed the query.
    QueryFailed,
    /// A result row could not be fetched or decoded.
    RowFailed,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Config => "CONFIG",
            ClientCode::ClientUnavailable => "CLIENT_UNAVAILABLE",
            ClientCode::QueryFailed => "QUERY_FAILED",
            ClientCode::RowFailed => "ROW_FAILED",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Unified error type used by core and gateway.
///
/// The three request-stage variants (`Client`, `Query`, `Row`) are all
/// reported to callers as the same opaque internal error.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("config: {0}")]
    Config(String),
    #[error("create warehouse client: {0}")]
    Client(String),
    #[error("run query: {0}")]
    Query(String),
    #[error("iterate results: {0}")]
    Row(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl EvalError {
    /// Map internal error to a stable code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            EvalError::Config(_) => ClientCode::Config,
            EvalError::Client(_) => ClientCode::ClientUnavailable,
            EvalError::Query(_) => ClientCode::QueryFailed,
            EvalError::Row(_) => ClientCode::RowFailed,
            EvalError::Internal(_) => ClientCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_keep_detail_in_display() {
        let err = EvalError::Client("GOOGLE_CLOUD_PROJECT is not set".into());
        assert_eq!(err.client_code(), ClientCode::ClientUnavailable);
        assert_eq!(
            err.to_string(),
            "create warehouse client: GOOGLE_CLOUD_PROJECT is not set"
        );
        assert_eq!(EvalError::Row("eof".into()).client_code().as_str(), "ROW_FAILED");
    }
}
