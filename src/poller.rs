//! Query Poller
//!
//! Polls one result window of a remote query until it reaches a terminal
//! state. Pending/executing polls use exponential backoff with jitter;
//! throttled requests use a separate, longer backoff that does not consume
//! the poll budget.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::query::{QueryClient, QueryError, QueryRef, QueryState};

/// Maximum number of state polls before giving up
pub const MAX_POLL_ATTEMPTS: u32 = 20;

/// Base delay between state polls
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Cap for the state-poll delay
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Base delay after a rate-limit response
pub const RATE_LIMIT_BACKOFF_MS: u64 = 5000;

/// Cap for the rate-limit delay
pub const MAX_RATE_LIMIT_BACKOFF_MS: u64 = 60_000;

/// Upper bound (exclusive) of the jitter fraction
pub const MAX_JITTER: f64 = 0.1;

/// Configuration for polling
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Maximum pending/executing polls
    pub max_attempts: u32,
    /// Base poll delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum poll delay in milliseconds
    pub max_backoff_ms: u64,
    /// Base rate-limit delay in milliseconds
    pub rate_limit_backoff_ms: u64,
    /// Maximum rate-limit delay in milliseconds
    pub max_rate_limit_backoff_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_POLL_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            rate_limit_backoff_ms: RATE_LIMIT_BACKOFF_MS,
            max_rate_limit_backoff_ms: MAX_RATE_LIMIT_BACKOFF_MS,
        }
    }
}

impl PollerConfig {
    /// Create a default config with the given poll budget
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay before poll `attempt + 1`: `min(base * 2^attempt * (1 + jitter), cap)`
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = jitter.clamp(0.0, MAX_JITTER);
        let base = self.initial_backoff_ms as f64 * 2f64.powi(attempt.min(30) as i32);
        let delay_ms = (base * (1.0 + jitter)).min(self.max_backoff_ms as f64);
        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Delay after the `attempt`-th consecutive rate-limit response
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .rate_limit_backoff_ms
            .saturating_mul(2u64.pow(attempt.min(16)));
        Duration::from_millis(delay_ms.min(self.max_rate_limit_backoff_ms))
    }
}

/// Uniform jitter fraction in `[0, MAX_JITTER)`
fn next_jitter() -> f64 {
    rand::thread_rng().gen_range(0.0..MAX_JITTER)
}

/// Poller that turns a `QueryClient` into completed result windows
pub struct QueryPoller<C> {
    client: C,
    config: PollerConfig,
}

impl<C: QueryClient> QueryPoller<C> {
    pub fn new(client: C, config: PollerConfig) -> Self {
        Self { client, config }
    }

    /// Create with default configuration
    pub fn with_default_config(client: C) -> Self {
        Self::new(client, PollerConfig::default())
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Start a fresh execution, waiting out rate-limit responses
    pub async fn execute(&self, query_id: u64, parameters: &BTreeMap<String, String>) -> Result<QueryRef, QueryError> {
        let label = format!("execute of query {}", query_id);
        self.retry_rate_limited(&label, || self.client.execute(query_id, parameters))
            .await
    }

    /// Poll one result window until the query completes
    ///
    /// # Returns
    /// The raw rows of the window
    pub async fn fetch_page(&self, query: &QueryRef, limit: usize, offset: usize) -> Result<Vec<Value>, QueryError> {
        let mut attempt: u32 = 0;

        loop {
            let response = self
                .retry_rate_limited(query, || self.client.fetch_results(query, limit, offset))
                .await?;

            match (response.state, response.rows) {
                (QueryState::Completed, Some(rows)) => {
                    debug!("{} offset {} completed with {} rows", query, offset, rows.len());
                    return Ok(rows);
                }
                (state, _) if state.is_failure() => {
                    return Err(QueryError::ExecutionFailed {
                        query: query.to_string(),
                        reason: response
                            .error
                            .unwrap_or_else(|| format!("{:?}", state)),
                    });
                }
                (state, _) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        return Err(QueryError::TimedOut {
                            query: query.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.config.backoff_delay(attempt - 1, next_jitter());
                    debug!(
                        "{} is {:?} (poll {}/{}), waiting {:?}",
                        query, state, attempt, self.config.max_attempts, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Repeat `request` while it is rate limited
    ///
    /// The rate-limit counter lives for one call, so it starts from the base
    /// delay again after any response that was not throttled.
    async fn retry_rate_limited<T, F, Fut>(&self, target: &(dyn fmt::Display + Sync), mut request: F) -> Result<T, QueryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
    {
        let mut rate_limit_attempt: u32 = 0;

        loop {
            match request().await {
                Err(QueryError::RateLimited) => {
                    let delay = self.config.rate_limit_delay(rate_limit_attempt);
                    rate_limit_attempt = rate_limit_attempt.saturating_add(1);
                    warn!(
                        "Rate limited on {} (hit {}), waiting {:?}",
                        target, rate_limit_attempt, delay
                    );
                    sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
