//! Byte-range proxy between HTTP clients and the bucket.

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;
use tracing::debug;

use crate::{
    catalog::Catalog,
    gateway::{ByteRange, GatewayError},
};

pub const DEFAULT_VIDEO_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("video not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Upstream(GatewayError),
}

impl From<GatewayError> for StreamError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { key } => Self::NotFound(key),
            other => Self::Upstream(other),
        }
    }
}

/// Serves `filename` to an HTTP client.
///
/// The filename is resolved against a fresh bucket listing. With a public
/// base URL configured the client is redirected there; otherwise the bytes
/// are piped through, honouring the first range of a `Range` header.
pub async fn stream_video(
    catalog: &Catalog,
    filename: &str,
    range_header: Option<&HeaderValue>,
) -> Result<Response, StreamError> {
    let video = catalog
        .find_video(filename)
        .await?
        .ok_or_else(|| StreamError::NotFound(filename.to_string()))?;

    if let Some(url) = catalog.links().public_url(&video.key) {
        debug!(filename, %url, "redirecting to public url");
        return Ok(Redirect::temporary(&url).into_response());
    }

    let gateway = catalog.gateway();
    let size = gateway.head(&video.key).await?.size;
    let content_type = video_content_type(filename);
    let range = range_header.and_then(|value| parse_range_header(value, size));

    let Some((start, end)) = range else {
        let stream = gateway.fetch(&video.key, None).await?;
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            Body::from_stream(stream),
        )
            .into_response());
    };

    if start >= size {
        return Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [
                (header::CONTENT_RANGE, format!("bytes */{size}")),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
        )
            .into_response());
    }

    let range = ByteRange {
        start,
        end: end.min(size - 1),
    };
    debug!(filename, start = range.start, end = range.end, size, "proxying range");
    let stream = gateway.fetch(&video.key, Some(range)).await?;
    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, range.len().to_string()),
            (
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{size}", range.start, range.end),
            ),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

fn video_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::VIDEO)
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| DEFAULT_VIDEO_CONTENT_TYPE.to_string())
}

/// Parses `bytes=<start>-<end>`, `bytes=<start>-` and `bytes=-<suffix>`.
///
/// Only the first range of a multi-range header is considered. The returned
/// end is not clamped to `size`.
pub fn parse_range_header(value: &HeaderValue, size: u64) -> Option<(u64, u64)> {
    let value = value.to_str().ok()?.trim();
    let (unit, ranges) = value.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }
    let range = ranges.split(',').next()?.trim();
    let (start_str, end_str) = range.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        return Some((size.saturating_sub(suffix_len), size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        size.saturating_sub(1).max(start)
    } else {
        end_str.parse().ok()?
    };
    (end >= start).then_some((start, end))
}
