//! Single-flight download cache
//!
//! At most one download is ever in flight per remote key. The first caller
//! for a key becomes its downloader; callers arriving while the download is
//! in flight attach to the same outcome, and every one of them observes the
//! identical local path. The state map's lock covers only the state
//! transition itself, never the network I/O, so distinct keys download
//! concurrently.
//!
//! A failed download releases its key and publishes a classified failure to
//! all current waiters; the next caller for that key starts a fresh attempt.

use crate::remote::RemoteKey;
use crate::{DownloadKind, Error, Result};

use object_store::ObjectStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fetch cache configuration
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Directory raw downloads are written to. The layout is flat: each file
    /// is named by its key's final path segment.
    pub cache_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("temp"),
        }
    }
}

/// Terminal outcome of one download, shared with every waiter.
#[derive(Debug, Clone)]
struct FetchFailure {
    kind: DownloadKind,
    message: String,
}

impl FetchFailure {
    fn cancelled() -> Self {
        Self {
            kind: DownloadKind::Cancelled,
            message: "fetch cache disposed".to_string(),
        }
    }

    fn classify(error: Error) -> Self {
        let kind = match &error {
            Error::ObjectStore(source) => match source {
                object_store::Error::NotFound { .. }
                | object_store::Error::InvalidPath { .. }
                | object_store::Error::PermissionDenied { .. }
                | object_store::Error::Unauthenticated { .. } => DownloadKind::Fatal,
                _ => DownloadKind::Retryable,
            },
            _ => DownloadKind::Fatal,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }

    fn into_error(self, key: &RemoteKey) -> Error {
        Error::Download {
            key: key.to_string(),
            kind: self.kind,
            message: self.message,
        }
    }
}

type FetchOutcome = std::result::Result<PathBuf, FetchFailure>;

/// Per-key download state.
enum FetchState {
    /// One download in flight; waiters attach to the channel.
    Pending(watch::Receiver<Option<FetchOutcome>>),
    /// Download finished; the local copy lives at this path.
    Present(PathBuf),
}

struct Inner {
    store: Arc<dyn ObjectStore>,
    cache_dir: PathBuf,
    states: Mutex<HashMap<String, FetchState>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: CancellationToken,
}

/// Single-flight, concurrency-safe local cache of downloaded objects.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
}

impl FetchCache {
    pub fn new(store: Arc<dyn ObjectStore>, config: FetchConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                cache_dir: config.cache_dir,
                states: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Local path a key's download lands at.
    ///
    /// The layout is flat, so two distinct keys sharing a final segment
    /// would collide. GOES object names embed product, channel and scan
    /// time, which keeps segments unique in practice.
    fn local_path(&self, key: &RemoteKey) -> PathBuf {
        self.inner.cache_dir.join(key.file_name())
    }

    /// Returns the local path for `key`, downloading the object first if no
    /// caller already has.
    ///
    /// Concurrent calls for the same key share one download; calls for
    /// distinct keys proceed independently. A cached key returns without
    /// touching the network.
    pub async fn get(&self, key: &RemoteKey) -> Result<PathBuf> {
        let mut rx = {
            let mut states = self.inner.states.lock();
            match states.get(key.as_str()) {
                Some(FetchState::Present(path)) => {
                    debug!(key = %key, "fetch cache hit");
                    return Ok(path.clone());
                }
                Some(FetchState::Pending(rx)) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    states.insert(key.as_str().to_string(), FetchState::Pending(rx.clone()));
                    self.spawn_download(key.clone(), tx);
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|value| (*value).clone())
            // The sender is only dropped without an outcome if its task was
            // torn down mid-dispose.
            .map_err(|_| FetchFailure::cancelled().into_error(key))?;

        match outcome {
            Some(Ok(path)) => Ok(path),
            Some(Err(failure)) => Err(failure.into_error(key)),
            None => Err(FetchFailure::cancelled().into_error(key)),
        }
    }

    fn spawn_download(&self, key: RemoteKey, tx: watch::Sender<Option<FetchOutcome>>) {
        let inner = self.inner.clone();
        let dest = self.local_path(&key);
        let task_key = key.as_str().to_string();

        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = inner.shutdown.cancelled() => Err(FetchFailure::cancelled()),
                result = download(&inner.store, &key, dest) => {
                    result.map_err(FetchFailure::classify)
                }
            };

            {
                let mut states = inner.states.lock();
                match &outcome {
                    Ok(path) => {
                        states.insert(key.as_str().to_string(), FetchState::Present(path.clone()));
                    }
                    Err(failure) => {
                        // Release the key so a later caller can retry.
                        states.remove(key.as_str());
                        warn!(
                            key = %key,
                            kind = ?failure.kind,
                            "download failed: {}",
                            failure.message
                        );
                    }
                }
            }

            tx.send_replace(Some(outcome));
            inner.tasks.lock().remove(key.as_str());
        });

        self.inner
            .tasks
            .lock()
            .insert(task_key, handle);
    }

    /// Cancels every in-flight download, awaits their termination and
    /// releases any waiter blocked on a cancelled key with a `Cancelled`
    /// download error. Never fails; join errors are swallowed.
    pub async fn dispose(&self) {
        self.inner.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.inner.tasks.lock();
            tasks.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn download(store: &Arc<dyn ObjectStore>, key: &RemoteKey, dest: PathBuf) -> Result<PathBuf> {
    let bytes = store.get(&key.object_path()).await?.bytes().await?;
    tokio::fs::write(&dest, &bytes).await?;
    debug!(key = %key, size = bytes.len(), "downloaded remote object");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::PutPayload;
    use tempfile::tempdir;

    const KEY: &str = "ABI-L2-CMIPF/2025/226/19/OR_ABI-L2-CMIPF-M6C01_G19_s20252261900204.nc";

    fn config(dir: &tempfile::TempDir) -> FetchConfig {
        FetchConfig {
            cache_dir: dir.path().join("temp"),
        }
    }

    #[tokio::test]
    async fn test_get_downloads_to_flat_cache_dir() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemory::new());
        store
            .put(&ObjectPath::from(KEY), PutPayload::from_static(b"netcdf"))
            .await
            .unwrap();

        let cache = FetchCache::new(store, config(&dir)).unwrap();
        let key = RemoteKey::new(KEY);
        let path = cache.get(&key).await.unwrap();

        assert_eq!(path, dir.path().join("temp").join(key.file_name()));
        assert_eq!(std::fs::read(&path).unwrap(), b"netcdf");
    }

    #[tokio::test]
    async fn test_get_cached_key_returns_same_path() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemory::new());
        store
            .put(&ObjectPath::from(KEY), PutPayload::from_static(b"netcdf"))
            .await
            .unwrap();

        let cache = FetchCache::new(store, config(&dir)).unwrap();
        let key = RemoteKey::new(KEY);
        let first = cache.get(&key).await.unwrap();
        let second = cache.get(&key).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_download_releases_key_for_retry() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemory::new());
        let cache = FetchCache::new(store.clone(), config(&dir)).unwrap();
        let key = RemoteKey::new(KEY);

        let err = cache.get(&key).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Download {
                    kind: DownloadKind::Fatal,
                    ..
                }
            ),
            "{err}"
        );

        // The object appears; a fresh call must retry instead of hanging.
        store
            .put(&ObjectPath::from(KEY), PutPayload::from_static(b"late"))
            .await
            .unwrap();
        let path = cache.get(&key).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_quiet() {
        let dir = tempdir().unwrap();
        let cache = FetchCache::new(Arc::new(InMemory::new()), config(&dir)).unwrap();
        cache.dispose().await;
        cache.dispose().await;
    }

    #[tokio::test]
    async fn test_get_after_dispose_reports_cancelled() {
        let dir = tempdir().unwrap();
        let store = Arc::new(InMemory::new());
        store
            .put(&ObjectPath::from(KEY), PutPayload::from_static(b"netcdf"))
            .await
            .unwrap();

        let cache = FetchCache::new(store, config(&dir)).unwrap();
        cache.dispose().await;

        let err = cache.get(&RemoteKey::new(KEY)).await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Download {
                    kind: DownloadKind::Cancelled,
                    ..
                }
            ),
            "{err}"
        );
    }
}
