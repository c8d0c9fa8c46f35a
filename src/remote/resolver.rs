//! Remote key resolution
//!
//! GOES objects live under `PRODUCT/YYYY/DDD/HH/` with the scan start time
//! embedded in the object name (`..._sYYYYDDDHHMMSSS...`). Resolution floors
//! the requested timestamp to its ten-minute bucket, scopes a listing to the
//! bucket's hour and picks the first object carrying the bucket's scan token.

use crate::bucket::TimeBucket;
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Substring marking channel-bearing object keys (ABI mode-6 channel token,
/// e.g. `M6C01`).
const CHANNEL_MARKER: &str = "M6C";

/// Path-like identifier of one object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey(String);

impl RemoteKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, used to name the locally cached copy.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub(crate) fn object_path(&self) -> ObjectPath {
        ObjectPath::from(self.0.as_str())
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps abstract `(product, channel, timestamp)` requests onto concrete
/// remote object keys.
pub struct KeyResolver {
    store: Arc<dyn ObjectStore>,
}

impl KeyResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Resolves one request to the key of an existing remote object.
    ///
    /// Every call re-lists the remote store; nothing is cached across
    /// resolutions. When several objects match the bucket, the listing
    /// order of the store decides which key is returned.
    pub async fn resolve(
        &self,
        product: &str,
        channel: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<RemoteKey> {
        let bucket = TimeBucket::floor(at);

        if self.channel_in_key(product).await? && channel.is_none() {
            return Err(Error::ChannelRequired {
                product: product.to_string(),
            });
        }

        let prefix = ObjectPath::from(format!("{}/{}", product, bucket.hour_prefix()));
        let token = bucket.scan_token();
        debug!(product, prefix = %prefix, token = %token, "listing remote objects");

        let mut listing = self.store.list(Some(&prefix));
        while let Some(meta) = listing.next().await {
            let key = meta?.location.to_string();
            if !key.contains(&token) {
                continue;
            }
            match channel {
                Some(channel) if !key.contains(channel) => continue,
                _ => {
                    debug!(product, key = %key, "resolved remote key");
                    return Ok(RemoteKey(key));
                }
            }
        }

        Err(Error::KeyNotFound {
            product: product.to_string(),
            channel: channel.map(str::to_string),
            bucket: bucket.index_key(),
        })
    }

    /// Samples one object under the product prefix to decide whether this
    /// product's keys embed a channel token. A heuristic probe: an empty
    /// listing reads as channel-free.
    async fn channel_in_key(&self, product: &str) -> Result<bool> {
        let prefix = ObjectPath::from(product);
        let mut listing = self.store.list(Some(&prefix));
        match listing.next().await {
            Some(meta) => Ok(meta?.location.as_ref().contains(CHANNEL_MARKER)),
            None => Ok(false),
        }
    }
}
