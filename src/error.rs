//! Error types for goesfetch

use std::fmt;

/// Result type alias for goesfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed download, used by callers to decide whether a
/// retry can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// Transient failure (network, timeout). A later attempt may succeed.
    Retryable,
    /// Permanent failure (missing object, permission denied).
    Fatal,
    /// The fetch cache was disposed while the download was in flight.
    Cancelled,
}

/// Error types for goesfetch
#[derive(Debug)]
pub enum Error {
    /// The product embeds a channel token in its object keys but the request
    /// did not name one
    ChannelRequired { product: String },
    /// No remote object matched the requested time bucket
    KeyNotFound {
        product: String,
        channel: Option<String>,
        bucket: String,
    },
    /// A download started but did not produce a usable local file
    Download {
        key: String,
        kind: DownloadKind,
        message: String,
    },
    /// Object store errors
    ObjectStore(object_store::Error),
    /// IO errors
    Io(std::io::Error),
    /// Index (de)serialization errors
    Json(serde_json::Error),
    /// An index entry that does not parse as a time bucket
    InvalidBucket(String),
    /// Configuration errors
    Config(String),
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Download {
                kind: DownloadKind::Retryable,
                ..
            }
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ObjectStore(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChannelRequired { product } => {
                write!(f, "product {} requires a channel", product)
            }
            Error::KeyNotFound {
                product,
                channel,
                bucket,
            } => match channel {
                Some(channel) => {
                    write!(f, "product {}/{} not found at {}", product, channel, bucket)
                }
                None => write!(f, "product {} not found at {}", product, bucket),
            },
            Error::Download { key, kind, message } => {
                write!(f, "download of {} failed ({:?}): {}", key, kind, message)
            }
            Error::ObjectStore(e) => write!(f, "object store error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Json(e) => write!(f, "index serialization error: {}", e),
            Error::InvalidBucket(s) => write!(f, "invalid time bucket: {}", s),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        Error::ObjectStore(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}
