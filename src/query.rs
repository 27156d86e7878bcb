//! Analytical Query Client
//!
//! The seam between the poller and the remote query engine. Implementations
//! return one result window per call; the poller decides what to do with the
//! reported state.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while fetching query results
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query {query} failed: {reason}")]
    ExecutionFailed { query: String, reason: String },

    #[error("Query {query} did not complete after {attempts} polls")]
    TimedOut { query: String, attempts: u32 },

    #[error("Rate limited by query API")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Query API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Page size must be greater than zero")]
    InvalidPageSize,
}

/// Reference to a saved query or to one of its executions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRef {
    /// Latest results of a saved query, with optional parameters
    Query {
        id: u64,
        parameters: BTreeMap<String, String>,
    },
    /// Results of a specific execution
    Execution(String),
}

impl QueryRef {
    pub fn query(id: u64) -> Self {
        QueryRef::Query {
            id,
            parameters: BTreeMap::new(),
        }
    }

    /// Add a query parameter; no effect on execution references
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        if let QueryRef::Query { parameters, .. } = &mut self {
            parameters.insert(name.into(), value.to_string());
        }
        self
    }
}

impl fmt::Display for QueryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRef::Query { id, .. } => write!(f, "query {}", id),
            QueryRef::Execution(id) => write!(f, "execution {}", id),
        }
    }
}

/// Execution state reported by the query engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    #[serde(rename = "QUERY_STATE_PENDING")]
    Pending,
    #[serde(rename = "QUERY_STATE_EXECUTING")]
    Executing,
    #[serde(rename = "QUERY_STATE_COMPLETED")]
    Completed,
    #[serde(rename = "QUERY_STATE_FAILED")]
    Failed,
    #[serde(rename = "QUERY_STATE_CANCELLED")]
    Cancelled,
    #[serde(rename = "QUERY_STATE_EXPIRED")]
    Expired,
    #[serde(other)]
    Unknown,
}

impl QueryState {
    /// States after which polling stops with an error
    pub fn is_failure(&self) -> bool {
        matches!(self, QueryState::Failed | QueryState::Cancelled | QueryState::Expired)
    }
}

/// One poll response: state plus the requested result window, if ready
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub state: QueryState,
    pub rows: Option<Vec<Value>>,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn pending() -> Self {
        Self::with_state(QueryState::Pending)
    }

    pub fn executing() -> Self {
        Self::with_state(QueryState::Executing)
    }

    pub fn completed(rows: Vec<Value>) -> Self {
        Self {
            state: QueryState::Completed,
            rows: Some(rows),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: QueryState::Failed,
            rows: None,
            error: Some(reason.into()),
        }
    }

    fn with_state(state: QueryState) -> Self {
        Self {
            state,
            rows: None,
            error: None,
        }
    }
}

/// Source of query results
///
/// `RateLimited` must be returned for out-of-band throttling so the poller
/// can apply its separate backoff.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn fetch_results(
        &self,
        query: &QueryRef,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResponse, QueryError>;

    /// Start a fresh execution of a saved query
    ///
    /// Engines without separate executions read the latest results of the
    /// saved query instead.
    async fn execute(&self, query_id: u64, parameters: &BTreeMap<String, String>) -> Result<QueryRef, QueryError> {
        Ok(QueryRef::Query {
            id: query_id,
            parameters: parameters.clone(),
        })
    }
}

#[async_trait]
impl<C: QueryClient + ?Sized> QueryClient for std::sync::Arc<C> {
    async fn fetch_results(
        &self,
        query: &QueryRef,
        limit: usize,
        offset: usize,
    ) -> Result<QueryResponse, QueryError> {
        (**self).fetch_results(query, limit, offset).await
    }

    async fn execute(&self, query_id: u64, parameters: &BTreeMap<String, String>) -> Result<QueryRef, QueryError> {
        (**self).execute(query_id, parameters).await
    }
}
