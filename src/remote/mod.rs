//! Remote acquisition of GOES objects
//!
//! The [`KeyResolver`] maps an abstract `(product, channel, timestamp)`
//! request onto the key of a concrete remote object; the [`FetchCache`]
//! downloads each key at most once and serves the shared local path to every
//! caller. [`RemoteRepository`] ties both together over one object-store
//! handle and owns their teardown.

mod fetch;
mod resolver;

pub use fetch::{FetchCache, FetchConfig};
pub use resolver::{KeyResolver, RemoteKey};

use crate::product::ProductRequest;
use crate::Result;

use chrono::{DateTime, Utc};
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Resolver and fetch cache over one shared remote store.
pub struct RemoteRepository {
    resolver: KeyResolver,
    cache: FetchCache,
}

impl RemoteRepository {
    pub fn new(store: Arc<dyn ObjectStore>, config: FetchConfig) -> Result<Self> {
        Ok(Self {
            resolver: KeyResolver::new(store.clone()),
            cache: FetchCache::new(store, config)?,
        })
    }

    /// Resolves and downloads one product for the scan containing `at`,
    /// returning the local path of the raw object.
    pub async fn fetch(&self, request: &ProductRequest, at: DateTime<Utc>) -> Result<PathBuf> {
        let key = self
            .resolver
            .resolve(&request.product, request.channel.as_deref(), at)
            .await?;
        self.cache.get(&key).await
    }

    /// Fetches several products concurrently, preserving request order in
    /// the returned paths. Fails on the first request that fails.
    pub async fn fetch_all(
        &self,
        requests: &[ProductRequest],
        at: DateTime<Utc>,
    ) -> Result<Vec<PathBuf>> {
        futures::future::try_join_all(requests.iter().map(|request| self.fetch(request, at))).await
    }

    /// Cancels in-flight downloads and releases their waiters. Never fails.
    pub async fn dispose(&self) {
        self.cache.dispose().await;
    }
}
