//! TxnScope Analytics
//!
//! Ranks the contracts reached through multiSend batches over a recent
//! period and writes the ranking as JSON.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use txnscope_analytics::config::{AnalyticsConfig, PERIOD_PARAMETER};
use txnscope_analytics::labels::KNOWN_LABELS;
use txnscope_analytics::{
    DuneClient, LabelCache, MultiSendDecoder, PaginatedFetcher, Pipeline, QueryPoller, QueryRef, Report,
    SelectorRegistry,
};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AnalyticsConfig::from_env().context("Invalid configuration")?;
    info!(
        "Ranking multiSend destinations for query {} over {} days",
        config.query_id, config.period_days
    );

    let client = DuneClient::new(&config.api_key, &config.api_url)?;
    let poller = QueryPoller::new(client, config.poller.clone());
    let saved = QueryRef::query(config.query_id).with_parameter(PERIOD_PARAMETER, config.period_days);
    let query = match saved {
        QueryRef::Query { id, parameters } if config.execute => poller.execute(id, &parameters).await?,
        other => other,
    };

    let pipeline = Pipeline::new(PaginatedFetcher::new(poller, config.page_size), config.top_count);
    let decoder = MultiSendDecoder::new(SelectorRegistry::standard());
    let mut aggregation = pipeline.run_multisend(&query, &decoder).await?;

    match &config.label_cache_path {
        Some(path) => {
            let mut cache = LabelCache::load(path).unwrap_or_else(|e| {
                warn!("Ignoring unreadable label cache: {}", e);
                LabelCache::new(path)
            });
            cache.seed(KNOWN_LABELS);
            aggregation.decorate(&cache);
            if cache.is_dirty() {
                if let Err(e) = cache.save() {
                    warn!("Failed to save label cache: {}", e);
                }
            }
        }
        None => {
            let known: HashMap<String, String> = KNOWN_LABELS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            aggregation.decorate(&known);
        }
    }

    let report = Report::from_aggregation(&aggregation, config.period_days, config.top_count);
    report
        .write_to(&config.output_path)
        .with_context(|| format!("Writing {}", config.output_path.display()))?;

    for entry in report.rankings.iter().take(10) {
        info!(
            "#{} {} interactions={} gas={}",
            entry.rank, entry.label, entry.interactions, entry.total_gas
        );
    }
    Ok(())
}
