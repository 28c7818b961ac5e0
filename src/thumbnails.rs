//! Cache-aside thumbnails.
//!
//! A thumbnail is looked up in order: local cache directory, the bucket's
//! `thumbnails/` prefix, then generated from the video itself. Whatever fails
//! along the way degrades to [`FALLBACK_THUMBNAIL`]; callers never see an
//! error.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tempfile::TempPath;
use tokio::{io::AsyncWriteExt, process::Command, sync::Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::{
    filename,
    gateway::{ByteStream, ObjectGateway, encode_url_segment},
};

pub const THUMBNAIL_PREFIX: &str = "thumbnails";
pub const THUMBNAIL_EXTENSION: &str = "png";
/// URL prefix under which the local cache directory is served.
pub const THUMBNAIL_ROUTE: &str = "/thumbnails";
pub const FALLBACK_THUMBNAIL: &str = "/static/default-thumbnail.png";

/// Position of the captured frame inside the video.
pub const CAPTURE_OFFSET: Duration = Duration::from_secs(5);
pub const THUMBNAIL_SIZE: (u32, u32) = (320, 180);

/// Produces a still image from a local video file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        offset: Duration,
        size: (u32, u32),
    ) -> Result<()>;
}

/// [`FrameExtractor`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    binary: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        offset: Duration,
        (width, height): (u32, u32),
    ) -> Result<()> {
        let result = Command::new(&self.binary)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-ss")
            .arg(offset.as_secs_f64().to_string())
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1"])
            .arg("-vf")
            .arg(format!("scale={width}:{height}"))
            .args(["-f", "image2"])
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("launching {}", self.binary.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!("ffmpeg exited with {}: {}", result.status, stderr.trim());
        }
        Ok(())
    }
}

/// How a thumbnail reference was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    LocalHit(String),
    RemoteHit(String),
    Generated(String),
    Fallback,
}

impl ThumbnailOutcome {
    /// URL the client should fetch.
    pub fn reference(&self) -> &str {
        match self {
            Self::LocalHit(url) | Self::RemoteHit(url) | Self::Generated(url) => url,
            Self::Fallback => FALLBACK_THUMBNAIL,
        }
    }
}

/// Steps of the lookup, evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Local,
    Remote,
    Generate,
}

/// Name of the cached image for a video, e.g. `Show.E01.png`.
pub fn thumbnail_name(video_filename: &str) -> String {
    format!(
        "{}.{THUMBNAIL_EXTENSION}",
        filename::base_name(video_filename)
    )
}

/// Bucket key of the shared copy, e.g. `thumbnails/Show.E01.png`.
pub fn remote_thumbnail_key(video_filename: &str) -> String {
    remote_key_for(&thumbnail_name(video_filename))
}

fn remote_key_for(name: &str) -> String {
    format!("{THUMBNAIL_PREFIX}/{name}")
}

pub struct ThumbnailCache {
    cache_dir: PathBuf,
    scratch_dir: PathBuf,
    gateway: Arc<dyn ObjectGateway>,
    extractor: Arc<dyn FrameExtractor>,
    publish_generated: bool,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("cache_dir", &self.cache_dir)
            .field("scratch_dir", &self.scratch_dir)
            .field("publish_generated", &self.publish_generated)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl ThumbnailCache {
    pub fn new(
        cache_dir: PathBuf,
        scratch_dir: PathBuf,
        gateway: Arc<dyn ObjectGateway>,
        extractor: Arc<dyn FrameExtractor>,
    ) -> Self {
        Self {
            cache_dir,
            scratch_dir,
            gateway,
            extractor,
            publish_generated: true,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Whether freshly generated images are uploaded to the bucket.
    pub fn publish_generated(mut self, publish: bool) -> Self {
        self.publish_generated = publish;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolves the thumbnail of the video stored at `key`.
    ///
    /// At most one lookup per thumbnail runs past the local check at a time;
    /// later callers wait and then usually find the image in the local cache.
    pub async fn resolve(&self, video_filename: &str, key: &str) -> ThumbnailOutcome {
        let name = thumbnail_name(video_filename);
        let local = self.cache_dir.join(&name);

        if is_cached(&local).await {
            return ThumbnailOutcome::LocalHit(self.url_for(&name));
        }

        let lock = self.generation_lock(&name);
        let guard = lock.lock().await;
        let outcome = self.resolve_exclusive(&name, &local, key).await;
        drop(guard);
        self.release_generation_lock(&name, lock);
        outcome
    }

    async fn resolve_exclusive(&self, name: &str, local: &Path, key: &str) -> ThumbnailOutcome {
        let mut step = Lookup::Local;
        loop {
            step = match step {
                Lookup::Local => {
                    if is_cached(local).await {
                        return ThumbnailOutcome::LocalHit(self.url_for(name));
                    }
                    Lookup::Remote
                }
                Lookup::Remote => match self.download_remote(name, local).await {
                    Ok(true) => {
                        debug!(thumbnail = name, "thumbnail restored from bucket");
                        return ThumbnailOutcome::RemoteHit(self.url_for(name));
                    }
                    Ok(false) => Lookup::Generate,
                    Err(err) => {
                        warn!(thumbnail = name, error = %err, "remote thumbnail download failed");
                        Lookup::Generate
                    }
                },
                Lookup::Generate => {
                    return match self.generate(key, local).await {
                        Ok(()) => {
                            info!(thumbnail = name, key, "generated thumbnail");
                            if self.publish_generated {
                                self.publish(name, local).await;
                            }
                            ThumbnailOutcome::Generated(self.url_for(name))
                        }
                        Err(err) => {
                            warn!(
                                thumbnail = name,
                                key,
                                error = %format!("{err:#}"),
                                "thumbnail generation failed, using fallback"
                            );
                            ThumbnailOutcome::Fallback
                        }
                    };
                }
            };
        }
    }

    fn url_for(&self, name: &str) -> String {
        format!("{THUMBNAIL_ROUTE}/{}", encode_url_segment(name))
    }

    fn generation_lock(&self, name: &str) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the map entry once no other caller holds or waits on it.
    fn release_generation_lock(&self, name: &str, lock: Arc<AsyncMutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        if Arc::strong_count(&lock) <= 2 {
            in_flight.remove(name);
        }
    }

    /// Copies `thumbnails/<name>` from the bucket into the local cache.
    /// Returns `Ok(false)` when the bucket has no such image.
    async fn download_remote(&self, name: &str, local: &Path) -> Result<bool> {
        let key = remote_key_for(name);
        let stream = match self.gateway.fetch(&key, None).await {
            Ok(stream) => stream,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        let part = self.cache_part_file()?;
        write_stream(stream, &part).await?;
        ensure_non_empty(&part).await?;
        part.persist(local)
            .with_context(|| format!("moving thumbnail into {}", local.display()))?;
        Ok(true)
    }

    /// Downloads the video into the scratch directory and captures a frame
    /// into the local cache. The scratch copy is removed on every exit path.
    async fn generate(&self, key: &str, local: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .with_context(|| format!("creating {}", self.scratch_dir.display()))?;
        let extension = Path::new(key)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let video = tempfile::Builder::new()
            .prefix("video-")
            .suffix(&extension)
            .tempfile_in(&self.scratch_dir)
            .context("creating scratch file")?
            .into_temp_path();

        let stream = self.gateway.fetch(key, None).await?;
        write_stream(stream, &video).await?;

        let image = self.cache_part_file()?;
        self.extractor
            .extract_frame(&video, &image, CAPTURE_OFFSET, THUMBNAIL_SIZE)
            .await?;
        ensure_non_empty(&image)
            .await
            .context("extractor produced no image")?;
        image
            .persist(local)
            .with_context(|| format!("moving thumbnail into {}", local.display()))?;
        Ok(())
    }

    async fn publish(&self, name: &str, local: &Path) {
        let key = remote_key_for(name);
        let result = match tokio::fs::read(local).await {
            Ok(bytes) => self
                .gateway
                .put(&key, Bytes::from(bytes))
                .await
                .map_err(anyhow::Error::from),
            Err(err) => Err(err.into()),
        };
        if let Err(err) = result {
            warn!(%key, error = %err, "publishing thumbnail failed");
        }
    }

    /// Temporary file inside the cache directory, so the final rename never
    /// crosses filesystems. Deleted on drop unless persisted.
    fn cache_part_file(&self) -> Result<TempPath> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("creating {}", self.cache_dir.display()))?;
        let file = tempfile::Builder::new()
            .prefix(".")
            .suffix(&format!(".part.{THUMBNAIL_EXTENSION}"))
            .tempfile_in(&self.cache_dir)
            .context("creating thumbnail temp file")?;
        Ok(file.into_temp_path())
    }
}

async fn is_cached(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

async fn ensure_non_empty(path: &Path) -> Result<()> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() == 0 {
        bail!("{} is empty", path.display());
    }
    Ok(())
}

async fn write_stream(mut stream: ByteStream, path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}
