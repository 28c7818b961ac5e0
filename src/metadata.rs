//! Metadata persistence layer for cloudtube.
//!
//! Metadata lives in two flat JSON documents next to the thumbnail cache: one
//! keyed by video filename, one keyed by series title. Each write replaces the
//! whole document (temporary file + rename), so readers never observe a
//! half-written file.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::filename;

pub const VIDEO_METADATA_FILE: &str = "video_metadata.json";
pub const SERIES_METADATA_FILE: &str = "series_metadata.json";

/// Shown when nobody wrote a description. Never persisted.
pub const DEFAULT_DESCRIPTION: &str = "No description available.";

/// Per-video metadata as persisted on disk.
///
/// Every field is optional so hand-edited documents with missing keys still
/// load. Non-empty titles and episode numbers are never replaced by values
/// derived from the filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetadataRecord {
    /// Fills absent or empty title/episode fields from `filename`. Returns
    /// whether anything changed.
    pub fn fill_missing(&mut self, filename: &str) -> bool {
        let needs_title = is_blank(&self.series_title) || is_blank(&self.display_title);
        if !needs_title && self.episode_number.is_some() {
            return false;
        }

        let parsed = filename::parse(filename);
        let mut changed = false;
        if is_blank(&self.series_title) {
            self.series_title = Some(parsed.series_title.clone());
            changed = true;
        }
        if is_blank(&self.display_title) {
            self.display_title = Some(parsed.series_title);
            changed = true;
        }
        if self.episode_number.is_none() && parsed.episode_number.is_some() {
            self.episode_number = parsed.episode_number;
            changed = true;
        }
        changed
    }

    /// Description with the read-time placeholder applied.
    pub fn description_or_default(&self) -> &str {
        match self.description.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => DEFAULT_DESCRIPTION,
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|text| text.trim().is_empty())
}

/// Overrides applied on top of a derived series aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

pub type MetadataMap = BTreeMap<String, MetadataRecord>;
pub type SeriesOverrides = BTreeMap<String, SeriesOverride>;

/// Owner of both metadata documents.
///
/// All read-modify-write cycles go through `write_lock`, so concurrent
/// requests resolving unseen filenames never interleave their writes.
#[derive(Debug)]
pub struct MetadataStore {
    videos_path: PathBuf,
    series_path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(data_root: &Path) -> Self {
        Self {
            videos_path: data_root.join(VIDEO_METADATA_FILE),
            series_path: data_root.join(SERIES_METADATA_FILE),
            write_lock: Mutex::new(()),
        }
    }

    /// Reads the per-video document. Missing or corrupt documents yield an
    /// empty mapping.
    pub async fn load(&self) -> MetadataMap {
        read_json_document(&self.videos_path).await
    }

    pub async fn save(&self, mapping: &MetadataMap) -> Result<()> {
        write_json_atomic(&self.videos_path, mapping).await
    }

    pub async fn load_series_overrides(&self) -> SeriesOverrides {
        read_json_document(&self.series_path).await
    }

    pub async fn save_series_overrides(&self, overrides: &SeriesOverrides) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.series_path, overrides).await
    }

    /// Resolves the metadata of a single video, persisting derived fields.
    pub async fn resolve(&self, filename: &str) -> MetadataRecord {
        let mut resolved = self.resolve_many([filename]).await;
        resolved.remove(filename).unwrap_or_default()
    }

    /// Resolves several videos with a single load and at most one save.
    ///
    /// A failed save only costs persistence: the returned records still carry
    /// every stored value plus the derived fills.
    pub async fn resolve_many<'a, I>(&self, filenames: I) -> HashMap<String, MetadataRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let _guard = self.write_lock.lock().await;
        let mut mapping = self.load().await;
        let mut resolved = HashMap::new();
        let mut dirty = false;

        for filename in filenames {
            let record = mapping.entry(filename.to_string()).or_default();
            if record.fill_missing(filename) {
                debug!(filename, "derived metadata from filename");
                dirty = true;
            }
            resolved.insert(filename.to_string(), record.clone());
        }

        if dirty && let Err(err) = self.save(&mapping).await {
            warn!(
                path = %self.videos_path.display(),
                error = %format!("{err:#}"),
                "persisting derived metadata failed"
            );
        }
        resolved
    }
}

async fn read_json_document<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "metadata document unreadable, using empty mapping");
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "metadata document corrupt, using empty mapping");
            T::default()
        }
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    let payload = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp_path, payload)
        .await
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
