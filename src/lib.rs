//! # goesfetch
//!
//! Fetching and local storage machinery for GOES satellite imagery
//! pipelines.
//!
//! GOES ABI products are published to public object-store buckets on a
//! ten-minute cadence. This crate covers the path from an abstract request
//! to bytes on disk:
//!
//! - **Key resolution**: `(product, optional channel, timestamp)` is floored
//!   to its ten-minute bucket and matched against a prefix listing of the
//!   remote store ([`remote::KeyResolver`]).
//! - **Single-flight downloads**: each remote key is downloaded at most once
//!   at a time; concurrent requesters share the resulting local path
//!   ([`remote::FetchCache`]).
//! - **Time-series storage**: derived artifacts get templated paths, a
//!   per-product index of retained buckets, bounded retention with
//!   oldest-first eviction, and index/filesystem reconciliation
//!   ([`store::TimeSeriesStore`]).
//!
//! Decoding, reprojection and rasterization are external concerns: they
//! consume the local paths this crate produces and write finished artifacts
//! to the paths the store allocates.

pub mod bucket;
pub mod config;
pub mod product;
pub mod remote;
pub mod store;

mod error;

pub use error::{DownloadKind, Error, Result};

use object_store::ObjectStore;
use std::sync::Arc;

/// Configuration for a full fetch-and-store pipeline.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Fetch cache configuration
    pub fetch: remote::FetchConfig,
    /// Artifact store configuration
    pub store: store::StoreConfig,
}

/// Resource context for a fetch-and-store pipeline.
///
/// Holds the remote repository and the artifact store, constructed once and
/// passed by reference to whatever consumes them. Teardown is explicit via
/// [`Context::dispose`], not process exit.
pub struct Context {
    repository: remote::RemoteRepository,
    store: store::TimeSeriesStore,
}

impl Context {
    pub fn new(object_store: Arc<dyn ObjectStore>, config: Config) -> Result<Self> {
        Ok(Self {
            repository: remote::RemoteRepository::new(object_store, config.fetch)?,
            store: store::TimeSeriesStore::new(config.store),
        })
    }

    pub fn repository(&self) -> &remote::RemoteRepository {
        &self.repository
    }

    pub fn store(&self) -> &store::TimeSeriesStore {
        &self.store
    }

    /// Cancels in-flight downloads and releases the remote side's waiters.
    /// Never fails. Store cleanup stays separate: see
    /// [`store::Storage::dispose`].
    pub async fn dispose(&self) {
        self.repository.dispose().await;
    }
}
