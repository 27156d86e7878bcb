//! Ranking Report
//!
//! JSON document handed to downstream consumers: run metadata plus the
//! ranked protocol list.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::aggregator::{Aggregation, ProtocolStat};

/// Errors that can occur while writing a report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Length of the analysed period in days
    pub period_days: u32,
    /// Requested size of the ranking
    pub top_count: usize,
    /// Unix timestamp in milliseconds when the report was generated
    pub generated_at: u64,
    /// Interactions across all keys, before truncation
    pub total_interactions: u64,
    /// Gas across all keys as decimal string
    pub total_gas: String,
    /// Value in wei across all keys as decimal string
    pub total_value: String,
    /// Number of distinct keys, before truncation
    pub distinct_keys: usize,
}

/// One ranked protocol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    /// 1-based rank
    pub rank: usize,
    /// Lower-case address or key
    pub address: String,
    /// Display label, falling back to the address
    pub label: String,
    pub interactions: u64,
    /// Gas as decimal string
    pub total_gas: String,
    /// Value in wei as decimal string
    pub total_value: String,
}

impl RankedEntry {
    fn from_stat(rank: usize, stat: &ProtocolStat) -> Self {
        Self {
            rank,
            address: stat.key.clone(),
            label: stat.display_name().to_string(),
            interactions: stat.interactions,
            total_gas: stat.total_gas.to_string(),
            total_value: format_value(stat.total_value),
        }
    }
}

/// Complete report document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub rankings: Vec<RankedEntry>,
}

impl Report {
    /// Build a report from an aggregation, stamped with the current time
    pub fn from_aggregation(aggregation: &Aggregation, period_days: u32, top_count: usize) -> Self {
        Self::with_timestamp(aggregation, period_days, top_count, current_timestamp_millis())
    }

    pub fn with_timestamp(aggregation: &Aggregation, period_days: u32, top_count: usize, generated_at: u64) -> Self {
        let metadata = ReportMetadata {
            period_days,
            top_count,
            generated_at,
            total_interactions: aggregation.total_interactions(),
            total_gas: aggregation.total_gas().to_string(),
            total_value: format_value(aggregation.total_value()),
            distinct_keys: aggregation.distinct_keys(),
        };
        let rankings = aggregation
            .ranked()
            .iter()
            .enumerate()
            .map(|(i, stat)| RankedEntry::from_stat(i + 1, stat))
            .collect();
        Self { metadata, rankings }
    }

    /// Serialize the report to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a report from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write the report to `path`, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        let write_err = |source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, json).map_err(write_err)?;
        info!("Wrote {} rankings to {}", self.rankings.len(), path.display());
        Ok(())
    }
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Format a U256 value as decimal string
pub fn format_value(value: U256) -> String {
    value.to_string()
}
