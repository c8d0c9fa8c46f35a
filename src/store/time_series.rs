//! Filesystem-backed time-series store with bounded retention

use super::{DateMatch, Storage};
use crate::bucket::TimeBucket;
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory of the store.
    pub root: PathBuf,
    /// Maximum retained buckets per product; `None` disables eviction.
    pub max_entries: Option<usize>,
    /// Directory layout template, expanded per (product, bucket).
    pub path_format: String,
    /// Optional file name template. When `None`, allocated paths address
    /// directories rather than files.
    pub filename_pattern: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            max_entries: Some(5),
            path_format: "{year}{month}{day}/{hour}{minute}/{product}".to_string(),
            filename_pattern: None,
        }
    }
}

/// Shape of the per-product index file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DateIndex {
    dates: Vec<String>,
}

/// Time-series store: templated artifact paths, a per-product index of known
/// buckets (in insertion order) and oldest-inserted-first eviction.
pub struct TimeSeriesStore {
    config: StoreConfig,
    /// Per-product guard around index read-modify-write. Without it,
    /// concurrent `create` calls for one product race on the index file and
    /// can leave more than `max_entries` buckets behind.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TimeSeriesStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            locks: DashMap::new(),
        }
    }

    fn product_lock(&self, product: &str) -> Arc<Mutex<()>> {
        self.locks.entry(product.to_string()).or_default().clone()
    }

    fn index_path(&self, product: &str) -> PathBuf {
        self.config
            .root
            .join("dates")
            .join(format!("date_{}.json", product))
    }

    fn load_index(&self, path: &Path) -> Result<DateIndex> {
        if !path.exists() {
            return Ok(DateIndex::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    fn persist_index(&self, path: &Path, index: &DateIndex) -> Result<()> {
        fs::write(path, serde_json::to_string(index)?)?;
        Ok(())
    }

    fn placeholders(product: &str, bucket: TimeBucket) -> [(&'static str, String); 7] {
        let start = bucket.start();
        [
            ("{year}", start.format("%Y").to_string()),
            ("{month}", start.format("%m").to_string()),
            ("{day}", start.format("%d").to_string()),
            ("{hour}", start.format("%H").to_string()),
            ("{minute}", start.format("%M").to_string()),
            ("{day_of_year}", start.format("%j").to_string()),
            ("{product}", product.to_string()),
        ]
    }

    fn expand(template: &str, placeholders: &[(&'static str, String)]) -> String {
        placeholders
            .iter()
            .fold(template.to_string(), |expanded, (token, value)| {
                expanded.replace(token, value)
            })
    }

    /// Full artifact path for one (product, bucket) pair.
    fn full_path(&self, product: &str, bucket: TimeBucket) -> PathBuf {
        let placeholders = Self::placeholders(product, bucket);
        let mut path = self
            .config
            .root
            .join(Self::expand(&self.config.path_format, &placeholders));
        if let Some(pattern) = &self.config.filename_pattern {
            path = path.join(Self::expand(pattern, &placeholders));
        }
        path
    }

    /// Deletes the oldest-inserted entries (and their backing files) until
    /// the index fits `max`. Oldest means earliest inserted, not earliest in
    /// time. A backing file already gone is a no-op.
    fn evict_oldest(&self, product: &str, dates: &mut Vec<String>, max: usize) {
        while dates.len() > max {
            let evicted = dates.remove(0);
            let bucket = match TimeBucket::parse_index_key(&evicted) {
                Ok(bucket) => bucket,
                Err(_) => {
                    warn!(product, entry = %evicted, "dropping malformed index entry");
                    continue;
                }
            };

            let path = self.full_path(product, bucket);
            if !path.exists() {
                continue;
            }
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => debug!(product, entry = %evicted, "evicted oldest bucket"),
                Err(error) => warn!(
                    product,
                    path = %path.display(),
                    %error,
                    "failed to remove evicted artifact"
                ),
            }
        }
    }
}

impl Storage for TimeSeriesStore {
    fn create(&self, product: &str, at: DateTime<Utc>, indexed: bool) -> Result<PathBuf> {
        let bucket = TimeBucket::floor(at);

        if indexed {
            let lock = self.product_lock(product);
            let _guard = lock.lock();

            fs::create_dir_all(self.config.root.join("dates"))?;
            let index_path = self.index_path(product);
            let mut index = self.load_index(&index_path)?;

            let key = bucket.index_key();
            if !index.dates.contains(&key) {
                index.dates.push(key);
                if let Some(max) = self.config.max_entries {
                    self.evict_oldest(product, &mut index.dates, max);
                }
                self.persist_index(&index_path, &index)?;
            }
        }

        let path = self.full_path(product, bucket);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn find_by_date(
        &self,
        product: &str,
        at: DateTime<Utc>,
        exact: bool,
    ) -> Result<Option<DateMatch>> {
        let bucket = TimeBucket::floor(at);

        if exact {
            let path = self.full_path(product, bucket);
            return Ok(path.exists().then(|| DateMatch::Exact(path)));
        }

        // Any placeholder the expansion left behind becomes a wildcard.
        let placeholders = Self::placeholders(product, bucket);
        let mut pattern = self
            .config
            .root
            .join(globify(&Self::expand(&self.config.path_format, &placeholders)));
        if let Some(filename) = &self.config.filename_pattern {
            pattern = pattern.join(globify(&Self::expand(filename, &placeholders)));
        }
        let pattern = pattern.to_string_lossy().into_owned();

        let matches = glob_paths(&pattern)?;
        if !matches.is_empty() {
            return Ok(Some(DateMatch::Fuzzy(matches)));
        }

        // Stored artifacts usually carry an extension the filename template
        // omits; retry with a wildcard suffix.
        let matches = glob_paths(&format!("{}.*", pattern))?;
        if !matches.is_empty() {
            return Ok(Some(DateMatch::Fuzzy(matches)));
        }
        Ok(None)
    }

    fn health_check(&self, product: &str) -> Result<usize> {
        let lock = self.product_lock(product);
        let _guard = lock.lock();

        let index_path = self.index_path(product);
        if !index_path.exists() {
            return Ok(0);
        }

        let index = self.load_index(&index_path)?;
        let mut valid = Vec::with_capacity(index.dates.len());
        let mut removed = 0usize;

        for entry in index.dates {
            match TimeBucket::parse_index_key(&entry) {
                Ok(bucket) if self.full_path(product, bucket).exists() => valid.push(entry),
                // Missing backing files and malformed entries both count as
                // stale.
                _ => removed += 1,
            }
        }

        if removed > 0 {
            self.persist_index(&index_path, &DateIndex { dates: valid })?;
            info!(product, removed, "health check dropped stale index entries");
        }
        Ok(removed)
    }

    fn dispose(&self) {
        remove_empty_dirs(&self.config.root);
        let _ = fs::remove_dir(&self.config.root);
    }
}

fn globify(expanded: &str) -> String {
    expanded.replace(['{', '}'], "*")
}

fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|e| Error::Config(format!("invalid search pattern {}: {}", pattern, e)))?;
    Ok(paths.filter_map(|path| path.ok()).collect())
}

/// Bottom-up removal of empty directories. Non-empty directories and
/// permission failures are left intact.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path);
            let _ = fs::remove_dir(&path);
        }
    }
}
