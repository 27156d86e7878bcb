//! TxnScope Analytics Library
//!
//! This crate provides components for ranking the protocols reached through
//! Safe `multiSend` batches: decoding packed batch calldata, polling a remote
//! analytical query engine page by page, and aggregating the results.

pub mod aggregator;
pub mod config;
pub mod cursor;
pub mod decoder;
pub mod dune;
pub mod fetcher;
pub mod labels;
pub mod pipeline;
pub mod poller;
pub mod query;
pub mod report;
pub mod selector;

// Re-export commonly used types
pub use aggregator::{aggregate, Aggregation, Aggregator, Interaction, ProtocolStat};
pub use config::{AnalyticsConfig, ConfigError};
pub use cursor::{BinaryCursor, CursorError};
pub use decoder::{decode_packed, MultiSendDecoder, Operation, PackedTransaction, ResolvedDestination};
pub use dune::DuneClient;
pub use fetcher::PaginatedFetcher;
pub use labels::{LabelCache, LabelLookup};
pub use pipeline::{Pipeline, PipelineError};
pub use poller::{PollerConfig, QueryPoller};
pub use query::{QueryClient, QueryError, QueryRef, QueryResponse, QueryState};
pub use report::Report;
pub use selector::{FunctionSchema, SelectorRegistry};
