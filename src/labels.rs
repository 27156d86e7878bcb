//! Contract Labels
//!
//! Display names for aggregated addresses, backed by an on-disk JSON cache.
//! A missing label is never an error; callers fall back to the address.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregator::normalize_key;

/// Default cache location under the user cache directory
pub const DEFAULT_CACHE_FILE: &str = "txnscope/labels.json";

/// Well-known mainnet contracts
pub const KNOWN_LABELS: &[(&str, &str)] = &[
    ("0xa238cbeb142c10ef7ad8442c6d1f9e89e07e7761", "Safe: MultiSend 1.3.0"),
    ("0x40a2accbd92bca938b02010e17a5b8929b49130d", "Safe: MultiSendCallOnly 1.3.0"),
    ("0x38869bf66a61cf6bdb996a6ae40d5853fd43b526", "Safe: MultiSend 1.4.1"),
    ("0x9641d764fc13c8b624c04430c7356c1c7c8102e2", "Safe: MultiSendCallOnly 1.4.1"),
    ("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "WETH"),
    ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC"),
    ("0xdac17f958d2ee523a2206206994597c13d831ec7", "USDT"),
];

/// Errors that can occur while loading or saving labels
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Label cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Label cache is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Key to display-name lookup
pub trait LabelLookup {
    fn label(&self, key: &str) -> Option<String>;
}

impl LabelLookup for HashMap<String, String> {
    fn label(&self, key: &str) -> Option<String> {
        self.get(&normalize_key(key)).cloned()
    }
}

/// Default label cache path, if a cache directory is known
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(DEFAULT_CACHE_FILE))
}

/// JSON-file backed label cache
#[derive(Debug, Clone)]
pub struct LabelCache {
    path: PathBuf,
    labels: BTreeMap<String, String>,
    dirty: bool,
}

impl LabelCache {
    /// Empty cache that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            labels: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the cache at `path`; a missing file yields an empty cache
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LabelError> {
        let path = path.into();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No label cache at {}", path.display());
                return Ok(Self::new(path));
            }
            Err(source) => return Err(LabelError::Io { path, source }),
        };

        let raw: BTreeMap<String, String> = serde_json::from_str(&contents)?;
        let labels = raw
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect::<BTreeMap<_, _>>();
        info!("Loaded {} labels from {}", labels.len(), path.display());
        Ok(Self {
            path,
            labels,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Whether entries were added since load or the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn insert(&mut self, key: &str, label: impl Into<String>) {
        let label = label.into();
        let key = normalize_key(key);
        if self.labels.get(&key) != Some(&label) {
            self.labels.insert(key, label);
            self.dirty = true;
        }
    }

    /// Add entries for keys that have no label yet
    ///
    /// # Returns
    /// Number of entries added
    pub fn seed(&mut self, entries: &[(&str, &str)]) -> usize {
        let mut added = 0;
        for (key, label) in entries {
            let key = normalize_key(key);
            if !self.labels.contains_key(&key) {
                self.labels.insert(key, label.to_string());
                added += 1;
            }
        }
        if added > 0 {
            self.dirty = true;
        }
        added
    }

    /// Write the cache, replacing the file atomically
    pub fn save(&mut self) -> Result<(), LabelError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let json = serde_json::to_string_pretty(&self.labels)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_error(&dir))?;
        tmp.write_all(json.as_bytes()).map_err(io_error(tmp.path()))?;
        tmp.persist(&self.path)
            .map_err(|e| io_error(&self.path)(e.error))?;

        self.dirty = false;
        debug!("Saved {} labels to {}", self.labels.len(), self.path.display());
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LabelError {
    let path = path.to_path_buf();
    move |source| LabelError::Io { path, source }
}

impl LabelLookup for LabelCache {
    fn label(&self, key: &str) -> Option<String> {
        self.labels.get(&normalize_key(key)).cloned()
    }
}
