//! Component factory for environment-based configuration
//!
//! GOES imagery is served from NOAA's open-data buckets with anonymous
//! access, so the S3 backend always skips request signing.

use crate::{Error, Result};
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::info;

/// Default NOAA open-data bucket for GOES-19.
pub const DEFAULT_BUCKET: &str = "noaa-goes19";

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create the remote object store from environment
    ///
    /// Environment variables:
    /// - STORAGE_BACKEND: "s3" (default) or "memory"
    /// - GOES_BUCKET: bucket name (default: noaa-goes19)
    /// - S3_REGION: region (default: us-east-1)
    /// - S3_ENDPOINT: custom endpoint (optional, for MinIO/LocalStack)
    pub fn create_object_store() -> Result<Arc<dyn ObjectStore>> {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "s3".to_string());

        match backend.as_str() {
            "memory" => {
                info!("Using in-memory object store (development mode)");
                Ok(Arc::new(InMemory::new()))
            }
            "s3" => {
                let bucket =
                    std::env::var("GOES_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());
                let region =
                    std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());

                info!("Using S3 object store: bucket={}, region={}", bucket, region);

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&bucket)
                    .with_region(&region)
                    // Open data: requests go out unsigned.
                    .with_skip_signature(true);

                if let Ok(endpoint) = std::env::var("S3_ENDPOINT") {
                    info!("Using custom S3 endpoint: {}", endpoint);
                    builder = builder.with_endpoint(&endpoint).with_allow_http(true);
                }

                Ok(Arc::new(builder.build()?))
            }
            other => Err(Error::Config(format!(
                "Unknown STORAGE_BACKEND: {}. Use 's3' or 'memory'",
                other
            ))),
        }
    }
}
