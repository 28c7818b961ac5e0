//! Series title / episode number heuristics for bare filenames.

use std::{path::Path, sync::LazyLock};

use regex::Regex;

static EPISODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)[ ._-]+(?:episode|ep|e)[ ._-]*(\d+)")
        .unwrap_or_else(|err| panic!("episode pattern must compile: {err}"))
});

/// What could be learned about a video from its filename alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub series_title: String,
    pub episode_number: Option<i64>,
}

/// Derives a series title and episode number from `filename`.
///
/// Names such as `Some.Show.E07.mp4`, `Some_Show - EP 7.mkv` or
/// `Some Show Episode 7.mp4` yield `("Some Show", Some(7))`. Anything else is
/// treated as a title without an episode number.
pub fn parse(filename: &str) -> ParsedName {
    let base = base_name(filename);

    if let Some(captures) = EPISODE_PATTERN.captures(base) {
        let title = normalize_title(&captures[1]);
        let episode = captures[2].parse::<i64>().ok();
        if !title.is_empty() && episode.is_some() {
            return ParsedName {
                series_title: title,
                episode_number: episode,
            };
        }
    }

    ParsedName {
        series_title: normalize_title(base),
        episode_number: None,
    }
}

/// Filename without its directory and extension.
pub fn base_name(filename: &str) -> &str {
    let path = Path::new(filename);
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
}

fn normalize_title(raw: &str) -> String {
    raw.replace(['.', '_'], " ").trim().to_string()
}
