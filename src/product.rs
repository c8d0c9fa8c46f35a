//! Product request parsing
//!
//! A request names an ABI product and, for per-channel products such as
//! CMIP, the channel to fetch. The wire form is `PRODUCT` or
//! `PRODUCT/CHANNEL`, e.g. `ABI-L2-CMIPF/C01`.

use std::fmt;

/// Cloud and Moisture Imagery, full disk.
pub const CMIP_FULL_DISK: &str = "ABI-L2-CMIPF";

/// One product to fetch, with its channel when the product is published
/// per channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductRequest {
    pub product: String,
    pub channel: Option<String>,
}

impl ProductRequest {
    pub fn new(product: impl Into<String>, channel: Option<String>) -> Self {
        Self {
            product: product.into(),
            channel,
        }
    }

    /// Splits `PRODUCT/CHANNEL` at the first slash; a request without a
    /// slash carries no channel.
    pub fn parse(request: &str) -> Self {
        match request.split_once('/') {
            Some((product, channel)) => Self::new(product, Some(channel.to_string())),
            None => Self::new(request, None),
        }
    }

    /// A single CMIP full-disk channel, e.g. `cmip(1)` for C01.
    pub fn cmip(channel: u8) -> Self {
        Self::new(CMIP_FULL_DISK, Some(format!("C{:02}", channel)))
    }

    /// CMIP full-disk channels `start..=end`, in order.
    pub fn cmip_range(start: u8, end: u8) -> Vec<Self> {
        (start..=end).map(Self::cmip).collect()
    }
}

impl From<&str> for ProductRequest {
    fn from(request: &str) -> Self {
        Self::parse(request)
    }
}

impl fmt::Display for ProductRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel {
            Some(channel) => write!(f, "{}/{}", self.product, channel),
            None => write!(f, "{}", self.product),
        }
    }
}
