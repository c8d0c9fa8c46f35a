//! Concurrency tests for the single-flight fetch cache
//!
//! These verify the cache's core guarantees under contention:
//! - N concurrent callers for one key trigger exactly one download and all
//!   receive the identical local path
//! - distinct keys download independently
//! - dispose cancels in-flight downloads and releases their waiters

use goesfetch::remote::{FetchCache, FetchConfig, RemoteKey};
use goesfetch::{DownloadKind, Error};

use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOpts, PutOptions, PutPayload, PutResult, Result as ObjectStoreResult,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const C01_KEY: &str = "ABI-L2-CMIPF/2025/226/19/OR_ABI-L2-CMIPF-M6C01_G19_s20252261900204.nc";
const C02_KEY: &str = "ABI-L2-CMIPF/2025/226/19/OR_ABI-L2-CMIPF-M6C02_G19_s20252261900204.nc";

/// In-memory store that counts GETs and can delay them, to make download
/// overlap observable.
struct CountingStore {
    inner: InMemory,
    gets: AtomicUsize,
    delay: Duration,
}

impl CountingStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: InMemory::new(),
            gets: AtomicUsize::new(0),
            delay,
        }
    }

    async fn seed(&self, key: &str) {
        self.inner
            .put(&Path::from(key), PutPayload::from_static(b"netcdf"))
            .await
            .unwrap();
    }

    fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl fmt::Display for CountingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountingStore({})", self.inner)
    }
}

impl fmt::Debug for CountingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingStore").finish()
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> ObjectStoreResult<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOpts,
    ) -> ObjectStoreResult<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &Path,
        options: GetOptions,
    ) -> ObjectStoreResult<GetResult> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &Path) -> ObjectStoreResult<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'_, ObjectStoreResult<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> ObjectStoreResult<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> ObjectStoreResult<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> ObjectStoreResult<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

fn cache_over(store: Arc<CountingStore>, dir: &tempfile::TempDir) -> FetchCache {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    FetchCache::new(
        store,
        FetchConfig {
            cache_dir: dir.path().join("temp"),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_concurrent_gets_share_one_download() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::from_millis(100)));
    store.seed(C01_KEY).await;
    let cache = cache_over(store.clone(), &dir);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.get(&RemoteKey::new(C01_KEY)).await
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(store.get_count(), 1, "expected a single remote download");
    assert!(
        paths.windows(2).all(|pair| pair[0] == pair[1]),
        "all callers must observe the identical path"
    );
}

#[tokio::test]
async fn test_distinct_keys_download_independently() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::from_millis(100)));
    store.seed(C01_KEY).await;
    store.seed(C02_KEY).await;
    let cache = cache_over(store.clone(), &dir);

    let a = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get(&RemoteKey::new(C01_KEY)).await })
    };
    let b = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get(&RemoteKey::new(C02_KEY)).await })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_ne!(a, b);
    assert_eq!(store.get_count(), 2);
}

#[tokio::test]
async fn test_dispose_releases_waiters_on_inflight_key() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::from_secs(30)));
    store.seed(C01_KEY).await;
    let cache = cache_over(store, &dir);

    let waiter = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get(&RemoteKey::new(C01_KEY)).await })
    };

    // Let the download get in flight before tearing down.
    tokio::time::sleep(Duration::from_millis(100)).await;
    cache.dispose().await;

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter must be released, not left hanging")
        .unwrap();

    match result {
        Err(Error::Download {
            kind: DownloadKind::Cancelled,
            ..
        }) => {}
        other => panic!("expected cancelled download, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retryable_classification_is_exposed() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CountingStore::new(Duration::from_millis(1)));
    let cache = cache_over(store, &dir);

    // Key was never seeded: the store reports NotFound, a fatal failure.
    let err = cache.get(&RemoteKey::new(C01_KEY)).await.unwrap_err();
    assert!(!err.is_retryable());
}
