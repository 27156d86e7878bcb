//! Analytics Pipeline
//!
//! Fetch every row of a query, turn each row into interactions and fold
//! them into a ranking. The same pipeline serves every row schema; callers
//! supply the row type and the extraction function.

use std::str::FromStr;

use alloy::primitives::U256;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregator::{Aggregation, Aggregator, Interaction};
use crate::decoder::{hex_to_bytes, MultiSendDecoder};
use crate::fetcher::PaginatedFetcher;
use crate::query::{QueryClient, QueryError, QueryRef};

/// Errors that fail a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetching {query} failed: {source}")]
    Fetch {
        query: String,
        #[source]
        source: QueryError,
    },
}

/// Outer transaction carrying `multiSend` calldata
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MultisendRow {
    #[serde(alias = "hash")]
    pub tx_hash: String,
    /// Hex-encoded calldata of the outer call
    #[serde(alias = "input")]
    pub data: String,
    #[serde(default, alias = "gas", deserialize_with = "deserialize_gas")]
    pub gas_used: u64,
}

/// Direct interaction with a contract
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InteractionRow {
    #[serde(alias = "to")]
    pub address: String,
    #[serde(default, alias = "gas", deserialize_with = "deserialize_gas")]
    pub gas_used: u64,
    #[serde(default, deserialize_with = "deserialize_u256")]
    pub value: U256,
}

impl InteractionRow {
    pub fn interaction(&self) -> Interaction {
        Interaction::new(self.address.as_str(), self.gas_used, self.value)
    }
}

/// Accept a U256 as decimal/hex string or JSON integer
fn deserialize_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(U256::ZERO),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| D::Error::custom(format!("value {} is not an unsigned integer", n))),
        Value::String(s) => U256::from_str(s.trim()).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("unexpected value {}", other))),
    }
}

/// Accept gas as a JSON integer or decimal string; null counts as zero
fn deserialize_gas<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("gas {} is not an unsigned integer", n))),
        Some(Value::String(s)) => s.trim().parse().map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!("unexpected gas {}", other))),
    }
}

/// Resolve the inner destinations of one multiSend row
///
/// Rows whose calldata is not valid hex are skipped.
pub fn multisend_interactions(decoder: &MultiSendDecoder, row: &MultisendRow) -> Vec<Interaction> {
    let calldata = match hex_to_bytes(&row.data) {
        Ok(calldata) => calldata,
        Err(e) => {
            warn!("Skipping {}: {}", row.tx_hash, e);
            return Vec::new();
        }
    };

    decoder
        .decode_batch_with_gas(&calldata, row.gas_used)
        .into_iter()
        .map(Interaction::from)
        .collect()
}

/// Generic fetch, extract and aggregate run
pub struct Pipeline<C> {
    fetcher: PaginatedFetcher<C>,
    top_count: usize,
}

impl<C: QueryClient> Pipeline<C> {
    pub fn new(fetcher: PaginatedFetcher<C>, top_count: usize) -> Self {
        Self { fetcher, top_count }
    }

    pub fn top_count(&self) -> usize {
        self.top_count
    }

    /// Fetch all rows of `query` and aggregate the interactions `extract` yields
    pub async fn run<T, F, I>(&self, query: &QueryRef, mut extract: F) -> Result<Aggregation, PipelineError>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> I,
        I: IntoIterator<Item = Interaction>,
    {
        let rows: Vec<T> = self
            .fetcher
            .fetch_all(query)
            .await
            .map_err(|source| PipelineError::Fetch {
                query: query.to_string(),
                source,
            })?;

        let mut aggregator = Aggregator::new();
        for row in &rows {
            aggregator.extend(extract(row));
        }
        info!(
            "Aggregated {} rows from {} into {} keys",
            rows.len(),
            query,
            aggregator.len()
        );

        Ok(aggregator.finish(self.top_count))
    }

    /// Run over multiSend rows, ranking the resolved inner destinations
    pub async fn run_multisend(&self, query: &QueryRef, decoder: &MultiSendDecoder) -> Result<Aggregation, PipelineError> {
        self.run(query, |row: &MultisendRow| multisend_interactions(decoder, row))
            .await
    }

    /// Run over direct interaction rows
    pub async fn run_interactions(&self, query: &QueryRef) -> Result<Aggregation, PipelineError> {
        self.run(query, |row: &InteractionRow| Some(row.interaction()))
            .await
    }
}
