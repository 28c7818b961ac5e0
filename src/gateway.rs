//! Object store gateway.
//!
//! The rest of the crate only talks to the bucket through [`ObjectGateway`],
//! which keeps the catalog, thumbnail cache and streaming proxy testable
//! against an in-memory bucket. [`BucketGateway`] is the production
//! implementation on top of the `object_store` crate.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{TryStreamExt, stream::BoxStream};
use object_store::{
    GetOptions, GetRange, ObjectStore, PutPayload, aws::AmazonS3Builder,
    local::LocalFileSystem, memory::InMemory, path::Path as ObjectPath, signer::Signer,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use thiserror::Error;
use tracing::debug;

/// Streaming body of a remote object (or a slice of one).
pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("object store request failed for {key}: {source}")]
    Upstream {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("signed URLs are not supported by this bucket")]
    Unsupported,

    #[error("invalid bucket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl GatewayError {
    fn from_store(key: &str, source: object_store::Error) -> Self {
        match source {
            object_store::Error::NotFound { .. } => Self::NotFound {
                key: key.to_string(),
            },
            source => Self::Upstream {
                key: key.to_string(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A single entry of a bucket listing or the result of a HEAD request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Key exactly as the store reports it. Pass it back unchanged to
    /// address the same object; use [`decode_key`] for display.
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Inclusive byte range, as used by HTTP `Range` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Addresses an existing key without encoding it a second time. Keys the
/// store would reject verbatim are encoded instead.
fn object_path(key: &str) -> ObjectPath {
    ObjectPath::parse(key).unwrap_or_else(|_| ObjectPath::from(key))
}

/// Human readable form of a key: every segment percent-decoded.
pub fn decode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Unreserved URL characters stay as they are.
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn encode_url_segment(segment: &str) -> String {
    utf8_percent_encode(segment, URL_SEGMENT).to_string()
}

/// URL path for a key, keeping `/` as the separator.
pub fn encode_url_path(key: &str) -> String {
    key.split('/')
        .map(encode_url_segment)
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
pub trait ObjectGateway: Send + Sync {
    /// Lists every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, GatewayError>;

    async fn head(&self, key: &str) -> Result<ObjectEntry, GatewayError>;

    /// Streams the whole object, or only `range` when given.
    async fn fetch(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, GatewayError>;

    async fn put(&self, key: &str, body: Bytes) -> Result<(), GatewayError>;

    /// Issues a time-limited URL granting direct read access to `key`.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, GatewayError>;
}

/// [`ObjectGateway`] backed by any `object_store` implementation. Signing is
/// only available when the backend can sign (S3).
#[derive(Clone)]
pub struct BucketGateway {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
}

impl fmt::Debug for BucketGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketGateway")
            .field("store", &self.store.to_string())
            .field("signing", &self.signer.is_some())
            .finish()
    }
}

impl BucketGateway {
    pub fn new(store: Arc<dyn ObjectStore>, signer: Option<Arc<dyn Signer>>) -> Self {
        Self { store, signer }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Bucket with no persistence, used for local experiments and tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), None)
    }

    /// Builds a gateway from `s3://bucket`, `file:///path` or `memory://`.
    ///
    /// S3 credentials, region and endpoint are taken from the usual `AWS_*`
    /// environment variables.
    pub fn from_url(bucket_url: &str) -> Result<Self, GatewayError> {
        let invalid = |reason: String| GatewayError::InvalidUrl {
            url: bucket_url.to_string(),
            reason,
        };

        if bucket_url.starts_with("s3://") {
            let s3 = AmazonS3Builder::from_env()
                .with_url(bucket_url)
                .build()
                .map_err(|err| invalid(err.to_string()))?;
            let s3 = Arc::new(s3);
            return Ok(Self::new(s3.clone(), Some(s3)));
        }

        if let Some(path) = bucket_url.strip_prefix("file://") {
            let local = LocalFileSystem::new_with_prefix(path).map_err(|err| invalid(err.to_string()))?;
            return Ok(Self::new(Arc::new(local), None));
        }

        if bucket_url == "memory://" {
            return Ok(Self::in_memory());
        }

        Err(invalid("expected s3://, file:// or memory://".to_string()))
    }
}

#[async_trait]
impl ObjectGateway for BucketGateway {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, GatewayError> {
        let prefix_path = (!prefix.is_empty()).then(|| object_path(prefix));
        let metas: Vec<_> = self
            .store
            .list(prefix_path.as_ref())
            .try_collect()
            .await
            .map_err(|err| GatewayError::from_store(prefix, err))?;

        Ok(metas
            .into_iter()
            .map(|meta| ObjectEntry {
                key: meta.location.to_string(),
                size: meta.size,
                last_modified: meta.last_modified,
            })
            .collect())
    }

    async fn head(&self, key: &str) -> Result<ObjectEntry, GatewayError> {
        let meta = self
            .store
            .head(&object_path(key))
            .await
            .map_err(|err| GatewayError::from_store(key, err))?;
        Ok(ObjectEntry {
            key: key.to_string(),
            size: meta.size,
            last_modified: meta.last_modified,
        })
    }

    async fn fetch(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, GatewayError> {
        let options = GetOptions {
            range: range.map(|range| GetRange::Bounded(range.start..range.end + 1)),
            ..GetOptions::default()
        };
        debug!(key, ?range, "fetching object");
        let result = self
            .store
            .get_opts(&object_path(key), options)
            .await
            .map_err(|err| GatewayError::from_store(key, err))?;

        let key = key.to_string();
        let stream = result
            .into_stream()
            .map_err(move |err| GatewayError::from_store(&key, err));
        Ok(Box::pin(stream))
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), GatewayError> {
        self.store
            .put(&object_path(key), PutPayload::from(body))
            .await
            .map_err(|err| GatewayError::from_store(key, err))?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, GatewayError> {
        let signer = self.signer.as_ref().ok_or(GatewayError::Unsupported)?;
        let url = signer
            .signed_url(Method::GET, &object_path(key), expires_in)
            .await
            .map_err(|err| GatewayError::from_store(key, err))?;
        Ok(url.to_string())
    }
}
