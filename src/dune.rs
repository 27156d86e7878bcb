//! Dune API Client
//!
//! `QueryClient` implementation over the Dune Analytics v1 HTTP API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::query::{QueryClient, QueryError, QueryRef, QueryResponse, QueryState};

/// Default API base URL
pub const DEFAULT_API_URL: &str = "https://api.dune.com/api/v1";

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-Dune-API-Key";

/// Per-request timeout
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    execution_id: String,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    state: QueryState,
    #[serde(default)]
    result: Option<ResultPayload>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    #[serde(default)]
    rows: Vec<Value>,
}

impl From<ResultsResponse> for QueryResponse {
    fn from(resp: ResultsResponse) -> Self {
        QueryResponse {
            state: resp.state,
            rows: resp.result.map(|r| r.rows),
            error: resp.error.map(|e| error_message(&e)),
        }
    }
}

/// Pull a readable message out of the engine's error field
fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

/// HTTP client for the Dune API
#[derive(Debug, Clone)]
pub struct DuneClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DuneClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create a client against the public API
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self, QueryError> {
        Self::new(api_key, DEFAULT_API_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Results URL and query-string pairs for a result window
    pub fn results_request(&self, query: &QueryRef, limit: usize, offset: usize) -> (String, Vec<(String, String)>) {
        let mut params = vec![
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        let url = match query {
            QueryRef::Query { id, parameters } => {
                params.extend(
                    parameters
                        .iter()
                        .map(|(k, v)| (format!("params.{}", k), v.clone())),
                );
                format!("{}/query/{}/results", self.base_url, id)
            }
            QueryRef::Execution(id) => format!("{}/execution/{}/results", self.base_url, id),
        };
        (url, params)
    }
}

/// Map throttling and non-success statuses to errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, QueryError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(QueryError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(QueryError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl QueryClient for DuneClient {
    async fn fetch_results(&self, query: &QueryRef, limit: usize, offset: usize) -> Result<QueryResponse, QueryError> {
        let (url, params) = self.results_request(query, limit, offset);
        debug!("Fetching {} (limit {}, offset {})", query, limit, offset);

        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&params)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: ResultsResponse = response.json().await?;
        Ok(body.into())
    }

    /// Returns a reference to the new execution for polling
    async fn execute(&self, query_id: u64, parameters: &BTreeMap<String, String>) -> Result<QueryRef, QueryError> {
        let url = format!("{}/query/{}/execute", self.base_url, query_id);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "query_parameters": parameters }))
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: ExecuteResponse = response.json().await?;
        info!("Started execution {} for query {}", body.execution_id, query_id);
        Ok(QueryRef::Execution(body.execution_id))
    }
}
