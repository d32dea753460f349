//! Object storage for processed videos.

use crate::config::StorageConfig;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore};
use rand::RngCore;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(#[from] object_store::Error),

    #[error("Upload failed: {0}")]
    UploadFailed(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct VideoStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl VideoStorage {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// S3 (or S3-compatible) bucket; credentials come from the standard AWS
    /// environment variables.
    pub fn s3(config: &StorageConfig) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.s3_bucket)
            .with_region(&config.s3_region);

        if let Some(endpoint) = &config.s3_endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Ok(Self::new(Arc::new(builder.build()?), &config.s3_bucket))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Streams `reader` to `key`, tagging the object with `content_type`.
    /// Returns the number of bytes written.
    pub async fn put_object<R>(
        &self,
        key: &str,
        reader: &mut R,
        content_type: &str,
    ) -> Result<u64, StorageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let start = Instant::now();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());

        let mut writer = BufWriter::new(Arc::clone(&self.store), ObjectPath::from(key))
            .with_attributes(attributes);

        let copied = match tokio::io::copy(reader, &mut writer).await {
            Ok(copied) => copied,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!(bucket = %self.bucket, key = %key, error = %abort_err, "aborting partial upload failed");
                }
                error!(bucket = %self.bucket, key = %key, error = %e, "object upload failed");
                return Err(e.into());
            }
        };

        writer.shutdown().await.map_err(|e| {
            error!(bucket = %self.bucket, key = %key, error = %e, "object upload failed");
            StorageError::UploadFailed(e)
        })?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "object upload successful"
        );

        Ok(copied)
    }
}

/// 32 random bytes from the thread-local CSPRNG, base64url without padding.
pub fn random_name() -> String {
    let mut buf = [0u8; 32];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// `<prefix>/<random>.<extension>`, or `<random>.<extension>` without a prefix.
pub fn object_key(prefix: Option<&str>, extension: &str) -> String {
    let name = format!("{}.{}", random_name(), extension);
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name,
    }
}
