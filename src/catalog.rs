//! Turns a bucket listing into the records served by the API.

use std::{cmp::Ordering, collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::{
    gateway::{
        GatewayError, ObjectEntry, ObjectGateway, decode_key, encode_url_path, encode_url_segment,
    },
    metadata::{MetadataRecord, MetadataStore, SeriesOverrides},
    thumbnails::{THUMBNAIL_PREFIX, ThumbnailCache},
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Upper bound on videos enriched at once; a cold cache downloads each one.
pub const ENRICH_CONCURRENCY: usize = 8;
/// Route that proxies video bytes when no direct URL is available.
pub const STREAM_ROUTE: &str = "/video";

/// A video as seen in one bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoObject {
    pub key: String,
    pub filename: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl VideoObject {
    /// Keeps only objects that look like videos. Generated thumbnails and
    /// other files sharing the bucket are skipped.
    pub fn from_entry(entry: ObjectEntry) -> Option<Self> {
        if entry.key.starts_with(&format!("{THUMBNAIL_PREFIX}/")) {
            return None;
        }
        let filename = decode_key(entry.key.rsplit('/').next()?);
        if filename.is_empty() {
            return None;
        }
        let is_video = mime_guess::from_path(&filename)
            .first()
            .is_some_and(|mime| mime.type_() == mime_guess::mime::VIDEO);
        is_video.then(|| Self {
            key: entry.key,
            filename,
            last_modified: entry.last_modified,
            size: entry.size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRecord {
    pub filename: String,
    pub url: String,
    pub thumbnail_url: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub last_modified: DateTime<Utc>,
    pub display_title: String,
    pub episode_number: Option<i64>,
    pub series_title: String,
    pub description: String,
    #[serde(skip)]
    pub key: String,
    #[serde(skip)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesAggregate {
    pub series_title: String,
    pub video_count: usize,
    pub thumbnail_url: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub last_modified: DateTime<Utc>,
    pub description: String,
}

fn serialize_timestamp<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

/// How playback URLs are handed out.
#[derive(Debug, Clone)]
pub struct PlaybackLinks {
    /// Base of publicly reachable object URLs; when set, clients get
    /// `<base>/<key>` and never go through this server.
    pub public_base_url: Option<String>,
    pub signed_url_ttl: Duration,
}

impl PlaybackLinks {
    pub fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), encode_url_path(key)))
    }
}

pub fn stream_route(filename: &str) -> String {
    format!("{STREAM_ROUTE}/{}", encode_url_segment(filename))
}

pub struct Catalog {
    gateway: Arc<dyn ObjectGateway>,
    metadata: Arc<MetadataStore>,
    thumbnails: Arc<ThumbnailCache>,
    video_prefix: String,
    links: PlaybackLinks,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("video_prefix", &self.video_prefix)
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    pub fn new(
        gateway: Arc<dyn ObjectGateway>,
        metadata: Arc<MetadataStore>,
        thumbnails: Arc<ThumbnailCache>,
        video_prefix: impl Into<String>,
        links: PlaybackLinks,
    ) -> Self {
        Self {
            gateway,
            metadata,
            thumbnails,
            video_prefix: video_prefix.into(),
            links,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn ObjectGateway> {
        &self.gateway
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn links(&self) -> &PlaybackLinks {
        &self.links
    }

    /// Fresh listing of every video in the bucket.
    pub async fn list_objects(&self) -> Result<Vec<VideoObject>, GatewayError> {
        let entries = self.gateway.list(&self.video_prefix).await?;
        Ok(entries.into_iter().filter_map(VideoObject::from_entry).collect())
    }

    /// Looks `filename` up in a fresh listing.
    pub async fn find_video(&self, filename: &str) -> Result<Option<VideoObject>, GatewayError> {
        let videos = self.list_objects().await?;
        Ok(videos.into_iter().find(|video| video.filename == filename))
    }

    /// Lists, resolves metadata for and enriches every video. A failing
    /// listing degrades to an empty catalog.
    pub async fn videos(&self) -> Vec<VideoRecord> {
        let objects = match self.list_objects().await {
            Ok(objects) => objects,
            Err(err) => {
                warn!(error = %err, "listing videos failed, serving empty catalog");
                return Vec::new();
            }
        };

        let metadata = self
            .metadata
            .resolve_many(objects.iter().map(|video| video.filename.as_str()))
            .await;
        self.enrich(objects, &metadata).await
    }

    /// Builds one [`VideoRecord`] per object. At most
    /// [`ENRICH_CONCURRENCY`] videos are resolved at a time and the result
    /// order is unspecified.
    pub async fn enrich(
        &self,
        objects: Vec<VideoObject>,
        metadata: &HashMap<String, MetadataRecord>,
    ) -> Vec<VideoRecord> {
        let pending = objects.into_iter().map(|video| {
            let record = metadata.get(&video.filename).cloned().unwrap_or_else(|| {
                let mut derived = MetadataRecord::default();
                derived.fill_missing(&video.filename);
                derived
            });
            self.enrich_one(video, record)
        });
        stream::iter(pending)
            .buffer_unordered(ENRICH_CONCURRENCY)
            .collect()
            .await
    }

    async fn enrich_one(&self, video: VideoObject, record: MetadataRecord) -> VideoRecord {
        let (thumbnail, url) = tokio::join!(
            self.thumbnails.resolve(&video.filename, &video.key),
            self.playback_url(&video),
        );

        let description = record.description_or_default().to_string();
        VideoRecord {
            url,
            thumbnail_url: thumbnail.reference().to_string(),
            last_modified: video.last_modified,
            display_title: record.display_title.unwrap_or_default(),
            episode_number: record.episode_number,
            series_title: record.series_title.unwrap_or_default(),
            description,
            filename: video.filename,
            key: video.key,
            size: video.size,
        }
    }

    async fn playback_url(&self, video: &VideoObject) -> String {
        if let Some(url) = self.links.public_url(&video.key) {
            return url;
        }
        match self
            .gateway
            .signed_url(&video.key, self.links.signed_url_ttl)
            .await
        {
            Ok(url) => url,
            Err(GatewayError::Unsupported) => stream_route(&video.filename),
            Err(err) => {
                warn!(key = %video.key, error = %err, "signing playback url failed");
                stream_route(&video.filename)
            }
        }
    }
}

/// Newest first; ties broken by filename so the output is stable.
pub fn sort_newest_first(records: &mut [VideoRecord]) {
    records.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Episode order within a series. Videos without an episode number go last.
pub fn sort_by_episode(records: &mut [VideoRecord]) {
    records.sort_by(|a, b| {
        let by_episode = match (a.episode_number, b.episode_number) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_episode.then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Videos whose series title equals `series_title`, ignoring case.
pub fn filter_series(records: Vec<VideoRecord>, series_title: &str) -> Vec<VideoRecord> {
    let wanted = series_title.trim().to_lowercase();
    records
        .into_iter()
        .filter(|record| record.series_title.to_lowercase() == wanted)
        .collect()
}

/// Case-insensitive substring search over filename, titles and description.
pub fn search(records: Vec<VideoRecord>, query: &str) -> Vec<VideoRecord> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| {
            let haystack = format!(
                "{}\n{}\n{}\n{}",
                record.filename, record.display_title, record.series_title, record.description
            )
            .to_lowercase();
            haystack.contains(&needle)
        })
        .collect()
}

/// Folds records, in the given order, into one aggregate per series title.
///
/// The thumbnail of a group is the one of the first record folded into it;
/// `last_modified` and `description` follow the most recently modified
/// member. The result is sorted newest first.
pub fn group_by_series(records: &[VideoRecord]) -> Vec<SeriesAggregate> {
    let mut groups: Vec<SeriesAggregate> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for record in records {
        match positions.get(record.series_title.as_str()) {
            Some(&index) => {
                let group = &mut groups[index];
                group.video_count += 1;
                if record.last_modified > group.last_modified {
                    group.last_modified = record.last_modified;
                    group.description = record.description.clone();
                }
            }
            None => {
                positions.insert(record.series_title.as_str(), groups.len());
                groups.push(SeriesAggregate {
                    series_title: record.series_title.clone(),
                    video_count: 1,
                    thumbnail_url: record.thumbnail_url.clone(),
                    last_modified: record.last_modified,
                    description: record.description.clone(),
                });
            }
        }
    }

    groups.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    groups
}

/// Replaces derived fields with the ones recorded in the series document.
pub fn apply_series_overrides(groups: &mut [SeriesAggregate], overrides: &SeriesOverrides) {
    for group in groups {
        let Some(entry) = overrides.get(&group.series_title) else {
            continue;
        };
        if let Some(description) = entry.description.as_deref().filter(|text| !text.trim().is_empty()) {
            group.description = description.to_string();
        }
        if let Some(thumbnail) = entry.thumbnail_url.as_deref().filter(|url| !url.trim().is_empty()) {
            group.thumbnail_url = thumbnail.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{DEFAULT_DESCRIPTION, MetadataMap, SeriesOverride},
        testing::{CountingGateway, ExtractorMode, FakeExtractor},
        thumbnails::FALLBACK_THUMBNAIL,
    };
    use chrono::TimeZone;
    use tempfile::{TempDir, tempdir};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(filename: &str, series: &str, episode: Option<i64>, modified: i64) -> VideoRecord {
        VideoRecord {
            filename: filename.into(),
            url: stream_route(filename),
            thumbnail_url: format!("/thumbnails/{filename}.png"),
            last_modified: at(modified),
            display_title: series.into(),
            episode_number: episode,
            series_title: series.into(),
            description: format!("about {filename}"),
            key: filename.into(),
            size: 10,
        }
    }

    struct CatalogFixture {
        _temp: TempDir,
        gateway: Arc<CountingGateway>,
        catalog: Catalog,
    }

    fn fixture(links: PlaybackLinks) -> CatalogFixture {
        fixture_with(links, Arc::new(FakeExtractor::new(ExtractorMode::Fails)))
    }

    fn fixture_with(links: PlaybackLinks, extractor: Arc<FakeExtractor>) -> CatalogFixture {
        let temp = tempdir().unwrap();
        let gateway = Arc::new(CountingGateway::new());
        let metadata = Arc::new(MetadataStore::new(temp.path()));
        let thumbnails = Arc::new(
            ThumbnailCache::new(
                temp.path().join("thumbnails"),
                temp.path().join("scratch"),
                gateway.clone(),
                extractor,
            )
            .publish_generated(false),
        );
        let catalog = Catalog::new(gateway.clone(), metadata, thumbnails, "", links);
        CatalogFixture {
            _temp: temp,
            gateway,
            catalog,
        }
    }

    fn proxy_links() -> PlaybackLinks {
        PlaybackLinks {
            public_base_url: None,
            signed_url_ttl: Duration::from_secs(3600),
        }
    }

    #[test]
    fn only_video_objects_are_catalogued() {
        let entry = |key: &str| ObjectEntry {
            key: key.into(),
            size: 1,
            last_modified: at(0),
        };
        let video = VideoObject::from_entry(entry("shows/Show.E01.mp4")).unwrap();
        assert_eq!(video.filename, "Show.E01.mp4");
        assert_eq!(video.key, "shows/Show.E01.mp4");
        assert!(VideoObject::from_entry(entry("Show.E01.mkv")).is_some());
        assert!(VideoObject::from_entry(entry("thumbnails/Show.E01.mp4")).is_none());
        assert!(VideoObject::from_entry(entry("notes.txt")).is_none());
        assert!(VideoObject::from_entry(entry("folder/")).is_none());
    }

    #[tokio::test]
    async fn videos_are_enriched_with_metadata_and_fallbacks() {
        let fx = fixture(proxy_links());
        fx.gateway.seed("Space.Saga.E02.mp4", &b"video"[..]).await;
        fx.gateway.seed("thumbnails/other.png", &b"png"[..]).await;

        let records = fx.catalog.videos().await;
        assert_eq!(records.len(), 1);
        let video = &records[0];
        assert_eq!(video.filename, "Space.Saga.E02.mp4");
        assert_eq!(video.series_title, "Space Saga");
        assert_eq!(video.display_title, "Space Saga");
        assert_eq!(video.episode_number, Some(2));
        assert_eq!(video.description, DEFAULT_DESCRIPTION);
        assert_eq!(video.thumbnail_url, FALLBACK_THUMBNAIL);
        assert_eq!(video.url, "/video/Space.Saga.E02.mp4");

        let persisted = fx.catalog.metadata().load().await;
        assert!(persisted.contains_key("Space.Saga.E02.mp4"));
    }

    #[tokio::test]
    async fn encoded_keys_are_catalogued_under_decoded_names() {
        let fx = fixture_with(
            proxy_links(),
            Arc::new(FakeExtractor::new(ExtractorMode::WritesImage)),
        );
        fx.gateway
            .seed_encoded("shows/[Sub] Show - E01 [1080p].mkv", b"video")
            .await;

        let records = fx.catalog.videos().await;
        assert_eq!(records.len(), 1);
        let video = &records[0];
        assert_eq!(video.filename, "[Sub] Show - E01 [1080p].mkv");
        assert_eq!(video.series_title, "[Sub] Show");
        assert_eq!(video.episode_number, Some(1));
        assert_eq!(video.url, "/video/%5BSub%5D%20Show%20-%20E01%20%5B1080p%5D.mkv");
        assert_eq!(
            video.thumbnail_url,
            "/thumbnails/%5BSub%5D%20Show%20-%20E01%20%5B1080p%5D.png"
        );
        assert!(
            fx.catalog
                .metadata()
                .load()
                .await
                .contains_key("[Sub] Show - E01 [1080p].mkv")
        );
    }

    #[tokio::test]
    async fn failed_metadata_save_keeps_stored_titles() {
        let fx = fixture(proxy_links());
        fx.gateway.seed("Show.E01.mp4", &b"video"[..]).await;
        let mut stored = MetadataMap::new();
        stored.insert(
            "Show.E01.mp4".into(),
            MetadataRecord {
                display_title: Some("Pilot".into()),
                series_title: Some("Curated".into()),
                episode_number: None,
                description: Some("Hand written".into()),
            },
        );
        fx.catalog.metadata().save(&stored).await.unwrap();
        std::fs::create_dir(fx._temp.path().join("video_metadata.tmp")).unwrap();

        let records = fx.catalog.videos().await;
        assert_eq!(records[0].display_title, "Pilot");
        assert_eq!(records[0].series_title, "Curated");
        assert_eq!(records[0].episode_number, Some(1));
        assert_eq!(records[0].description, "Hand written");
    }

    #[tokio::test]
    async fn cold_cache_generation_is_bounded() {
        let extractor = Arc::new(FakeExtractor::new(ExtractorMode::WritesImage));
        let fx = fixture_with(proxy_links(), extractor.clone());
        for episode in 1..=20 {
            fx.gateway
                .seed(&format!("Show.E{episode:02}.mp4"), &b"video"[..])
                .await;
        }

        let records = fx.catalog.videos().await;
        assert_eq!(records.len(), 20);
        assert_eq!(extractor.calls(), 20);
        assert!(extractor.peak() <= ENRICH_CONCURRENCY);
        assert!(
            records
                .iter()
                .all(|record| record.thumbnail_url.starts_with("/thumbnails/Show.E"))
        );
    }

    #[test]
    fn public_urls_encode_keys() {
        let links = PlaybackLinks {
            public_base_url: Some("https://cdn.example/".into()),
            signed_url_ttl: Duration::from_secs(60),
        };
        assert_eq!(
            links.public_url("shows/[x] a #1.mp4").as_deref(),
            Some("https://cdn.example/shows/%5Bx%5D%20a%20%231.mp4")
        );
        assert_eq!(stream_route("50% off?.mp4"), "/video/50%25%20off%3F.mp4");
    }

    #[tokio::test]
    async fn enrich_prefers_stored_metadata() {
        let fx = fixture(PlaybackLinks {
            public_base_url: Some("https://cdn.example/".into()),
            signed_url_ttl: Duration::from_secs(60),
        });
        let object = VideoObject {
            key: "shows/Show.E01.mp4".into(),
            filename: "Show.E01.mp4".into(),
            last_modified: at(5),
            size: 3,
        };
        let mut stored = MetadataMap::new();
        stored.insert(
            "Show.E01.mp4".into(),
            MetadataRecord {
                display_title: Some("Pilot".into()),
                series_title: Some("Show".into()),
                episode_number: Some(1),
                description: Some("Where it starts".into()),
            },
        );
        let metadata: HashMap<_, _> = stored.into_iter().collect();

        let records = fx.catalog.enrich(vec![object], &metadata).await;
        assert_eq!(records[0].display_title, "Pilot");
        assert_eq!(records[0].description, "Where it starts");
        assert_eq!(records[0].url, "https://cdn.example/shows/Show.E01.mp4");
    }

    struct UnreachableBucket;

    #[async_trait::async_trait]
    impl ObjectGateway for UnreachableBucket {
        async fn list(&self, _: &str) -> Result<Vec<ObjectEntry>, GatewayError> {
            Err(GatewayError::Upstream {
                key: String::new(),
                source: object_store::Error::Generic {
                    store: "unreachable",
                    source: "connection refused".into(),
                },
            })
        }
        async fn head(&self, key: &str) -> Result<ObjectEntry, GatewayError> {
            Err(GatewayError::NotFound { key: key.into() })
        }
        async fn fetch(
            &self,
            key: &str,
            _: Option<crate::gateway::ByteRange>,
        ) -> Result<crate::gateway::ByteStream, GatewayError> {
            Err(GatewayError::NotFound { key: key.into() })
        }
        async fn put(&self, _: &str, _: bytes::Bytes) -> Result<(), GatewayError> {
            Err(GatewayError::Unsupported)
        }
        async fn signed_url(&self, _: &str, _: Duration) -> Result<String, GatewayError> {
            Err(GatewayError::Unsupported)
        }
    }

    #[tokio::test]
    async fn failing_listing_degrades_to_empty_catalog() {
        let temp = tempdir().unwrap();
        let gateway: Arc<dyn ObjectGateway> = Arc::new(UnreachableBucket);
        let thumbnails = Arc::new(ThumbnailCache::new(
            temp.path().join("thumbnails"),
            temp.path().join("scratch"),
            gateway.clone(),
            Arc::new(FakeExtractor::new(ExtractorMode::Fails)),
        ));
        let catalog = Catalog::new(
            gateway,
            Arc::new(MetadataStore::new(temp.path())),
            thumbnails,
            "",
            proxy_links(),
        );
        assert!(catalog.videos().await.is_empty());
        assert!(catalog.metadata().load().await.is_empty());
    }

    #[tokio::test]
    async fn find_video_matches_exact_filename() {
        let fx = fixture(proxy_links());
        fx.gateway.seed("shows/Show.E01.mp4", &b"video"[..]).await;

        let found = fx.catalog.find_video("Show.E01.mp4").await.unwrap();
        assert_eq!(found.map(|video| video.key), Some("shows/Show.E01.mp4".into()));
        assert!(fx.catalog.find_video("show.e01.mp4").await.unwrap().is_none());
        assert_eq!(fx.gateway.lists(), 2);
    }

    #[test]
    fn timestamps_serialize_in_display_format() {
        let value = serde_json::to_value(record("a.mp4", "A", None, 0)).unwrap();
        assert_eq!(value["last_modified"], "2023-11-14 22:13:20");
        assert!(value.get("key").is_none());
        assert!(value.get("size").is_none());
        assert!(value["episode_number"].is_null());
    }

    #[test]
    fn aggregation_tracks_newest_member() {
        let a = record("a.mp4", "X", Some(1), 1);
        let b = record("b.mp4", "X", Some(2), 2);
        let c = record("c.mp4", "Y", None, 0);

        let groups = group_by_series(&[a.clone(), b.clone(), c]);
        assert_eq!(groups.len(), 2);
        let x = &groups[0];
        assert_eq!(x.series_title, "X");
        assert_eq!(x.video_count, 2);
        assert_eq!(x.last_modified, b.last_modified);
        assert_eq!(x.description, b.description);
        assert_eq!(x.thumbnail_url, a.thumbnail_url);
        assert_eq!(groups[1].series_title, "Y");
    }

    #[test]
    fn overrides_replace_derived_fields() {
        let mut groups = group_by_series(&[record("a.mp4", "X", None, 1)]);
        let mut overrides = SeriesOverrides::new();
        overrides.insert(
            "X".into(),
            SeriesOverride {
                description: Some("Curated".into()),
                thumbnail_url: Some(String::new()),
            },
        );
        apply_series_overrides(&mut groups, &overrides);
        assert_eq!(groups[0].description, "Curated");
        assert_eq!(groups[0].thumbnail_url, "/thumbnails/a.mp4.png");
    }

    #[test]
    fn search_matches_any_text_field() {
        let mut only = record("b.mp4", "Other", None, 1);
        only.description = "Contains the Needle here".into();
        let records = vec![record("a.mp4", "Show", None, 0), only];

        assert_eq!(search(records.clone(), "").len(), 2);
        let hits = search(records.clone(), "needle");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "b.mp4");
        assert_eq!(search(records.clone(), "SHOW").len(), 1);
        assert!(search(records, "absent").is_empty());
    }

    #[test]
    fn search_keeps_whitespace_in_query() {
        let mut spaced = record("a.mp4", "A", None, 0);
        spaced.description = "the needle".into();
        let mut joined = record("b.mp4", "B", None, 0);
        joined.description = "theneedle".into();
        let mut bare = record("c.mp4", "C", None, 0);
        bare.description = "plain".into();
        let records = vec![spaced, joined, bare];

        let hits = search(records.clone(), " needle");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "a.mp4");
        assert_eq!(search(records, " ").len(), 1);
    }

    #[test]
    fn series_filter_is_case_insensitive_and_exact() {
        let records = vec![
            record("a.mp4", "Show", Some(1), 0),
            record("b.mp4", "Show Extra", Some(1), 0),
        ];
        let hits = filter_series(records, "show");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "a.mp4");
    }

    #[test]
    fn orderings() {
        let mut records = vec![
            record("c.mp4", "S", None, 3),
            record("b.mp4", "S", Some(2), 1),
            record("a.mp4", "S", Some(1), 2),
            record("d.mp4", "S", Some(2), 2),
        ];

        sort_by_episode(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["a.mp4", "b.mp4", "d.mp4", "c.mp4"]);

        sort_newest_first(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["c.mp4", "a.mp4", "d.mp4", "b.mp4"]);
    }
}
