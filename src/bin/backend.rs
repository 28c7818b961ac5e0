#![forbid(unsafe_code)]

//! Axum backend that exposes a bucket full of videos as a browsable catalog.
//!
//! Listing endpoints always reflect a fresh bucket listing. Video bytes are
//! either proxied with range support or, when the bucket is public, handed
//! off through a redirect. Everything that is not an API route is served
//! from the static frontend directory.

use std::{
    io::SeekFrom,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use cloudtube::{
    catalog::{
        Catalog, PlaybackLinks, SeriesAggregate, VideoRecord, apply_series_overrides,
        filter_series, group_by_series, search, sort_by_episode, sort_newest_first,
    },
    config::{LogFormat, RuntimeOverrides, RuntimeSettings, resolve_runtime_settings},
    gateway::BucketGateway,
    metadata::MetadataStore,
    streaming::{StreamError, parse_range_header, stream_video},
    thumbnails::{FfmpegExtractor, ThumbnailCache},
};
use mime_guess::MimeGuess;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    signal,
};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Layout below DATA_ROOT.
const THUMBNAILS_SUBDIR: &str = "thumbnails";
const SCRATCH_SUBDIR: &str = "scratch";

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "backend",
    about = "Serve a video catalog stored in an object store bucket"
)]
struct BackendArgs {
    /// Directory holding metadata documents and the thumbnail cache.
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// Static frontend files.
    #[arg(long)]
    www_root: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    host: Option<String>,
    /// `s3://bucket`, `file:///path` or `memory://`.
    #[arg(long)]
    bucket_url: Option<String>,
    /// Alternative `.env` file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl From<BackendArgs> for RuntimeOverrides {
    fn from(args: BackendArgs) -> Self {
        Self {
            data_root: args.data_root,
            www_root: args.www_root,
            port: args.port,
            host: args.host,
            bucket_url: args.bucket_url,
            env_path: args.env_file,
        }
    }
}

#[derive(Clone)]
struct AppState {
    catalog: Arc<Catalog>,
    thumbnails_dir: Arc<PathBuf>,
    www_root: Arc<PathBuf>,
}

impl AppState {
    /// Wires the bucket, metadata documents and thumbnail cache together.
    fn from_settings(settings: &RuntimeSettings) -> Result<Self> {
        let thumbnails_dir = settings.data_root.join(THUMBNAILS_SUBDIR);
        let scratch_dir = settings.data_root.join(SCRATCH_SUBDIR);
        for dir in [&settings.data_root, &thumbnails_dir, &scratch_dir] {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        let gateway = Arc::new(
            BucketGateway::from_url(&settings.bucket_url).context("opening bucket")?,
        );
        let thumbnails = ThumbnailCache::new(
            thumbnails_dir.clone(),
            scratch_dir,
            gateway.clone(),
            Arc::new(FfmpegExtractor::new(&settings.ffmpeg_bin)),
        )
        .publish_generated(settings.publish_thumbnails);
        let catalog = Catalog::new(
            gateway,
            Arc::new(MetadataStore::new(&settings.data_root)),
            Arc::new(thumbnails),
            settings.video_prefix.clone(),
            PlaybackLinks {
                public_base_url: settings.public_base_url.clone(),
                signed_url_ttl: settings.signed_url_ttl,
            },
        );

        Ok(Self {
            catalog: Arc::new(catalog),
            thumbnails_dir: Arc::new(thumbnails_dir),
            www_root: Arc::new(settings.www_root.clone()),
        })
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(_) => Self::not_found("video not found"),
            StreamError::Upstream(err) => {
                error!(error = %err, "proxying video failed");
                Self::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct VideoQuery {
    series_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BackendArgs::parse();
    let settings = resolve_runtime_settings(args.into())?;
    init_tracing(settings.log_format);

    let host: IpAddr = settings
        .host
        .parse()
        .with_context(|| format!("invalid listen host {}", settings.host))?;
    let state = AppState::from_settings(&settings)?;
    let app = router(state);

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(
        %addr,
        bucket = %settings.bucket_url,
        public = settings.public_base_url.is_some(),
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(list_videos))
        .route("/api/series", get(list_series))
        .route("/api/series/{series_title}", get(get_series))
        .route("/api/search", get(search_videos))
        .route("/video/{filename}", get(stream_video_file))
        .route("/thumbnails/{file}", get(download_thumbnail))
        .fallback(static_fallback)
        .with_state(state)
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on the handler; Ctrl+C still ends the
    // process without it.
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<VideoQuery>,
) -> Json<Vec<VideoRecord>> {
    let mut records = state.catalog.videos().await;
    if let Some(series_title) = query
        .series_title
        .as_deref()
        .filter(|title| !title.trim().is_empty())
    {
        records = filter_series(records, series_title);
    }
    sort_newest_first(&mut records);
    Json(records)
}

async fn list_series(State(state): State<AppState>) -> Json<Vec<SeriesAggregate>> {
    let mut records = state.catalog.videos().await;
    // Fold in the same order the listing endpoint returns.
    sort_newest_first(&mut records);
    let mut series = group_by_series(&records);
    let overrides = state.catalog.metadata().load_series_overrides().await;
    apply_series_overrides(&mut series, &overrides);
    Json(series)
}

async fn get_series(
    State(state): State<AppState>,
    AxumPath(series_title): AxumPath<String>,
) -> Json<Vec<VideoRecord>> {
    let records = state.catalog.videos().await;
    let mut episodes = filter_series(records, &series_title);
    sort_by_episode(&mut episodes);
    Json(episodes)
}

async fn search_videos(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<VideoRecord>> {
    let records = state.catalog.videos().await;
    let mut hits = search(records, &query.q);
    sort_newest_first(&mut hits);
    Json(hits)
}

async fn stream_video_file(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let response = stream_video(&state.catalog, &filename, headers.get(header::RANGE)).await?;
    Ok(response)
}

async fn download_thumbnail(
    State(state): State<AppState>,
    AxumPath(file): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    ensure_safe_path_segment(&file)?;
    stream_file(state.thumbnails_dir.join(&file), Some(&headers)).await
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;

    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html"), None).await,
        Ok(_) => stream_file(target, None).await,
        Err(_) if should_fallback_to_index(request_path) => {
            stream_file(root.join("index.html"), None).await
        }
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

/// Extensionless paths are client-side routes of the frontend.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

/// Validates that a single dynamic path segment never escapes its base folder.
fn ensure_safe_path_segment(value: &str) -> ApiResult<()> {
    if value.is_empty()
        || Path::new(value)
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }

    Ok(())
}

/// Streams a local file, honouring a single `Range` when `headers` carry one.
async fn stream_file(path: PathBuf, headers: Option<&HeaderMap>) -> ApiResult<Response> {
    let mut file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("file not found"))?
        .len();

    let range = headers
        .and_then(|headers| headers.get(header::RANGE))
        .and_then(|value| parse_range_header(value, size));

    let mut response = match range {
        Some((start, _)) if start >= size => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{size}"))],
        )
            .into_response(),
        Some((start, end)) => {
            let end = end.min(size - 1);
            let length = end - start + 1;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|err| ApiError::internal(err.to_string()))?;
            let body = Body::from_stream(ReaderStream::new(file.take(length)));
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
                    (header::CONTENT_LENGTH, length.to_string()),
                ],
                body,
            )
                .into_response()
        }
        None => (
            [(header::CONTENT_LENGTH, size.to_string())],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }

    Ok(response)
}
