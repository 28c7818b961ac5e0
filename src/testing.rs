//! Test doubles shared by the unit tests.

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, PutPayload};

use crate::{
    gateway::{BucketGateway, ByteRange, ByteStream, GatewayError, ObjectEntry, ObjectGateway},
    thumbnails::FrameExtractor,
};

/// In-memory bucket that records how often each operation was used.
#[derive(Debug)]
pub struct CountingGateway {
    pub inner: BucketGateway,
    lists: AtomicUsize,
    heads: AtomicUsize,
    fetches: AtomicUsize,
    puts: AtomicUsize,
    signs: AtomicUsize,
    failing_prefix: Option<String>,
}

impl CountingGateway {
    pub fn new() -> Self {
        Self {
            inner: BucketGateway::in_memory(),
            lists: AtomicUsize::new(0),
            heads: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            signs: AtomicUsize::new(0),
            failing_prefix: None,
        }
    }

    /// Makes every fetch under `prefix` fail with an upstream error.
    pub fn failing_fetches_under(mut self, prefix: &str) -> Self {
        self.failing_prefix = Some(prefix.to_string());
        self
    }

    /// Stores an object without counting it as a call.
    pub async fn seed(&self, key: &str, body: impl Into<Bytes>) {
        self.inner.put(key, body.into()).await.unwrap();
    }

    /// Stores an object the way other `object_store` clients do, with
    /// reserved characters percent-encoded in the stored key.
    pub async fn seed_encoded(&self, raw_key: &str, body: &'static [u8]) {
        self.inner
            .store()
            .put(&object_store::path::Path::from(raw_key), PutPayload::from_static(body))
            .await
            .unwrap();
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.lists()
            + self.heads()
            + self.fetches()
            + self.puts.load(Ordering::SeqCst)
            + self.signs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectGateway for CountingGateway {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, GatewayError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix).await
    }

    async fn head(&self, key: &str) -> Result<ObjectEntry, GatewayError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn fetch(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(prefix) = &self.failing_prefix
            && key.starts_with(prefix.as_str())
        {
            return Err(GatewayError::Upstream {
                key: key.to_string(),
                source: object_store::Error::Generic {
                    store: "counting",
                    source: "injected failure".into(),
                },
            });
        }
        self.inner.fetch(key, range).await
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<(), GatewayError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, body).await
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String, GatewayError> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        self.inner.signed_url(key, expires_in).await
    }
}

/// Behaviour of [`FakeExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorMode {
    #[default]
    WritesImage,
    Fails,
    WritesNothing,
}

/// Frame extractor that never runs ffmpeg.
#[derive(Debug, Default)]
pub struct FakeExtractor {
    mode: ExtractorMode,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

pub const FAKE_IMAGE: &[u8] = b"PNGDATA";

impl FakeExtractor {
    pub fn new(mode: ExtractorMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most extractions observed running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameExtractor for FakeExtractor {
    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        _offset: Duration,
        _size: (u32, u32),
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        assert!(video.exists(), "scratch video must exist during extraction");
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        match self.mode {
            ExtractorMode::WritesImage => {
                tokio::fs::write(output, FAKE_IMAGE).await?;
                Ok(())
            }
            ExtractorMode::Fails => bail!("video too short"),
            ExtractorMode::WritesNothing => Ok(()),
        }
    }
}
