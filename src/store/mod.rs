//! Time-indexed artifact storage
//!
//! Artifacts are laid out under a configurable template keyed by product and
//! ten-minute time bucket. A per-product JSON index records which buckets
//! are retained; inserting beyond the configured capacity evicts the
//! oldest-inserted entries together with their backing files.

mod time_series;

pub use time_series::{StoreConfig, TimeSeriesStore};

use crate::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Result of a date lookup against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateMatch {
    /// The exact bucket path, confirmed to exist on disk.
    Exact(PathBuf),
    /// Paths found by wildcard search around the bucket.
    Fuzzy(Vec<PathBuf>),
}

/// Capability surface shared by storage variants.
///
/// All methods do blocking filesystem work. Callers running on an async
/// runtime should move them onto a blocking worker
/// (`tokio::task::spawn_blocking`) so they never stall in-flight network
/// operations.
pub trait Storage: Send + Sync {
    /// Allocates the artifact path for `product` in the bucket containing
    /// `at`, creating parent directories. When `indexed`, the bucket is also
    /// recorded in the product's index, evicting the oldest-inserted entries
    /// beyond the configured capacity. The path is returned either way; the
    /// caller is responsible for producing bytes at it.
    fn create(&self, product: &str, at: DateTime<Utc>, indexed: bool) -> Result<PathBuf>;

    /// Looks up the artifact path(s) for the bucket containing `at`. Exact
    /// mode returns the computed path only if it exists; fuzzy mode searches
    /// the filesystem with wildcards, retrying once with a wildcard
    /// file-extension suffix.
    fn find_by_date(&self, product: &str, at: DateTime<Utc>, exact: bool)
        -> Result<Option<DateMatch>>;

    /// Drops index entries whose backing file no longer exists, returning
    /// how many were removed. Idempotent; the index file itself survives
    /// even when emptied.
    fn health_check(&self, product: &str) -> Result<usize>;

    /// Best-effort bottom-up removal of empty directories under the store
    /// root, then of the root itself. Failures are ignored.
    fn dispose(&self);
}
