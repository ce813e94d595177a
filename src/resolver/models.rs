// Common data models for the resolution engine

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::errors::{FailureKind, ResolveError};
use super::extractors::BlockingReason;

/// Watch URL prefix used when only a platform ID is supplied
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Default number of search results
pub const DEFAULT_SEARCH_RESULTS: usize = 10;

/// Upper bound on search results per request
pub const MAX_SEARCH_RESULTS: usize = 20;

/// A media identifier normalized to a canonical URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    original: String,
    canonical: String,
}

impl Identifier {
    /// Build from the `url` / `id` request parameters (either may be used)
    pub fn parse(url: Option<&str>, id: Option<&str>) -> Result<Self, ResolveError> {
        let url = url.map(str::trim).filter(|s| !s.is_empty());
        let id = id.map(str::trim).filter(|s| !s.is_empty());

        let original = match id.or(url) {
            Some(value) => value.to_string(),
            None => return Err(ResolveError::invalid("Missing parameter \"url\" or \"id\"")),
        };

        // An explicit URL wins over an ID
        let raw = url.or(id).unwrap_or_default();
        let canonical = Self::canonicalize(raw)?;

        Ok(Self {
            original,
            canonical,
        })
    }

    /// Build from a bare platform ID (search entries)
    pub fn from_id(id: &str) -> Result<Self, ResolveError> {
        Self::parse(None, Some(id))
    }

    fn canonicalize(raw: &str) -> Result<String, ResolveError> {
        if let Ok(url) = Url::parse(raw) {
            if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
                return Ok(raw.to_string());
            }
        }

        if is_platform_id(raw) {
            return Ok(format!("{}{}", WATCH_URL_PREFIX, raw));
        }

        Err(ResolveError::invalid(format!(
            "Unsupported identifier: {}",
            raw
        )))
    }

    /// Text the caller supplied, used for correlation in responses
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn is_platform_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Free-text search request with a bounded result count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    limit: usize,
}

impl SearchQuery {
    /// `limit` is clamped to `1..=MAX_SEARCH_RESULTS`
    pub fn new(text: Option<&str>, limit: Option<usize>) -> Result<Self, ResolveError> {
        let text = text.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
            ResolveError::invalid("Missing query parameter \"q\"")
        })?;

        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_RESULTS)
            .clamp(1, MAX_SEARCH_RESULTS);

        Ok(Self {
            text: text.to_string(),
            limit,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Requested media shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityHint {
    /// Audio-only stream, highest bitrate
    #[default]
    Audio,
    /// Best video with audio merged upstream when possible
    Video,
    /// Best single file
    Best,
}

impl QualityHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Best => "best",
        }
    }

    /// yt-dlp format selector for this hint
    pub fn format_spec(&self) -> &'static str {
        match self {
            Self::Audio => "bestaudio/best",
            Self::Video => "bestvideo+bestaudio/best",
            Self::Best => "best",
        }
    }
}

impl FromStr for QualityHint {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "best" => Ok(Self::Best),
            other => Err(ResolveError::invalid(format!(
                "Unsupported quality \"{}\" (expected audio, video or best)",
                other
            ))),
        }
    }
}

impl fmt::Display for QualityHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stream descriptor as reported by the extraction backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFormat {
    #[serde(default, deserialize_with = "null_as_default")]
    pub format_id: String,
    pub ext: Option<String>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    /// Total bitrate in kbps
    pub tbr: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
    pub resolution: Option<String>,
    pub url: Option<String>,
}

impl RawFormat {
    fn codec_present(codec: &Option<String>) -> bool {
        codec
            .as_deref()
            .map_or(false, |c| !c.is_empty() && c != "none")
    }

    pub fn has_audio(&self) -> bool {
        Self::codec_present(&self.acodec)
    }

    pub fn has_video(&self) -> bool {
        Self::codec_present(&self.vcodec)
    }

    /// Audio codec present and no video stream
    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

/// Metadata and formats returned by one extraction attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub uploader: Option<String>,
    pub artist: Option<String>,
    pub channel: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub view_count: Option<u64>,
    pub ext: Option<String>,
    pub format_id: Option<String>,
    /// Best single URL reported directly by the backend
    pub url: Option<String>,
    pub webpage_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub formats: Vec<RawFormat>,
    /// Search mode only
    #[serde(default, deserialize_with = "null_as_default")]
    pub entries: Vec<RawExtraction>,
}

impl RawExtraction {
    pub fn best_thumbnail(&self) -> Option<String> {
        self.thumbnail.clone().or_else(|| {
            self.thumbnails
                .iter()
                .rev()
                .find_map(|t| t.url.clone())
        })
    }

    pub fn display_artist(&self) -> Option<String> {
        self.artist
            .clone()
            .or_else(|| self.uploader.clone())
            .or_else(|| self.channel.clone())
    }
}

/// A format chosen for the response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedFormat {
    pub format_id: String,
    pub url: String,
    pub ext: String,
    pub quality: String,
    pub bitrate: Option<f64>,
    pub filesize: Option<u64>,
    pub filesize_mb: Option<f64>,
    pub resolution: Option<String>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
}

impl SelectedFormat {
    pub fn from_raw(format: &RawFormat, url: &str) -> Self {
        let filesize = format.effective_size();
        let bitrate = if format.is_audio_only() {
            format.abr
        } else {
            format.tbr.or(format.abr)
        };

        Self {
            format_id: format.format_id.clone(),
            url: url.to_string(),
            ext: format.ext.clone().unwrap_or_else(|| "unknown".to_string()),
            quality: format
                .format_note
                .clone()
                .or_else(|| format.resolution.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            bitrate,
            filesize,
            filesize_mb: filesize.map(size_in_mb),
            resolution: format.resolution.clone(),
            acodec: format.acodec.clone(),
            vcodec: format.vcodec.clone(),
        }
    }

    /// Candidate built from the backend's general URL, bitrate unknown
    pub fn synthetic(url: &str, ext: Option<&str>) -> Self {
        Self {
            format_id: "best".to_string(),
            url: url.to_string(),
            ext: ext.unwrap_or("unknown").to_string(),
            quality: "best available".to_string(),
            bitrate: None,
            filesize: None,
            filesize_mb: None,
            resolution: None,
            acodec: None,
            vcodec: None,
        }
    }
}

fn size_in_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Successful resolution of one identifier
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub id: String,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub view_count: Option<u64>,
    pub chosen: SelectedFormat,
    pub top: Vec<SelectedFormat>,
}

/// Trace entry for one failed profile attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub profile: String,
    pub kind: FailureKind,
    pub reason: Option<BlockingReason>,
    pub message: String,
}

/// Terminal failure of a fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: Option<BlockingReason>,
    pub message: String,
    pub attempts: Vec<Attempt>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason: None,
            message: message.into(),
            attempts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Resolved(ResolvedMedia),
    Failed(Failure),
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Resolved(_) => None,
            Self::Failed(failure) => Some(failure.kind),
        }
    }
}

/// One search result, optionally with a resolved download link
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: Option<String>,
    pub url: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub channel: Option<String>,
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(Vec<SearchHit>),
    Failed(Failure),
}

/// Accepts integers, floats and null for size-like counters
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(value.and_then(|n| {
        n.as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    }))
}

/// Pixel dimensions, some extractors report them as floats
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u64(deserializer)?.and_then(|n| u32::try_from(n).ok()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
