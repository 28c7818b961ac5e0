#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_CLOUDTUBE_PORT: u16 = 8080;
pub const DEFAULT_CLOUDTUBE_HOST: &str = "127.0.0.1";
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";

/// Everything the backend needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub data_root: PathBuf,
    pub www_root: PathBuf,
    pub port: u16,
    pub host: String,
    pub bucket_url: String,
    pub video_prefix: String,
    pub public_base_url: Option<String>,
    pub signed_url_ttl: Duration,
    pub ffmpeg_bin: PathBuf,
    pub publish_thumbnails: bool,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Values supplied on the command line. They win over the environment and the
/// `.env` file.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_root: Option<PathBuf>,
    pub www_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub bucket_url: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_settings(&file_vars, env_var_string, overrides)
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let data_root = overrides
        .data_root
        .or_else(|| lookup("DATA_ROOT").map(PathBuf::from))
        .ok_or_else(|| anyhow!("DATA_ROOT not set"))?;
    let www_root = overrides
        .www_root
        .or_else(|| lookup("WWW_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| data_root.join("www"));
    let bucket_url = overrides
        .bucket_url
        .filter(|value| !value.trim().is_empty())
        .or_else(|| lookup("BUCKET_URL"))
        .ok_or_else(|| anyhow!("BUCKET_URL not set"))?;
    let port = overrides
        .port
        .or_else(|| lookup("CLOUDTUBE_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_CLOUDTUBE_PORT);
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("CLOUDTUBE_HOST"))
        .unwrap_or_else(|| DEFAULT_CLOUDTUBE_HOST.to_string());
    let signed_url_ttl = lookup("SIGNED_URL_TTL_SECS")
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SIGNED_URL_TTL);
    let publish_thumbnails = lookup("PUBLISH_THUMBNAILS")
        .map(|value| parse_bool(&value))
        .unwrap_or(true);

    Ok(RuntimeSettings {
        data_root,
        www_root,
        port,
        host,
        bucket_url,
        video_prefix: lookup("VIDEO_PREFIX").unwrap_or_default(),
        public_base_url: lookup("PUBLIC_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string()),
        signed_url_ttl,
        ffmpeg_bin: lookup("FFMPEG_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_BIN)),
        publish_thumbnails,
        log_format: lookup("LOG_FORMAT")
            .map(|value| LogFormat::parse(&value))
            .unwrap_or(LogFormat::Text),
    })
}

fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    })
}

/// Parses a dotenv-style file. A missing file is not an error.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
