// Response normalizer - outcome to stable output record
//
// Pure and total: the same outcome always produces the same record, and the
// record never carries profile names, cookie paths or credentials.

use serde::Serialize;

use super::errors::FailureKind;
use super::models::{
    Failure, Identifier, ResolutionOutcome, SearchHit, SearchOutcome, SearchQuery, SelectedFormat,
};

/// Shown to callers whose request was flagged as automated
pub const BOT_SUGGESTIONS: [&str; 3] = [
    "Wait 5-10 minutes and try again",
    "Try a different video",
    "Use videos from search results",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputRecord {
    Media(MediaRecord),
    Search(SearchRecord),
    Failure(FailureRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub success: bool,
    pub video_id: String,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub duration_string: Option<String>,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub view_count: Option<u64>,
    pub download_url: String,
    pub best_format: SelectedFormat,
    pub available_formats: Vec<SelectedFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRecord {
    pub success: bool,
    pub query: String,
    pub count: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub success: bool,
    pub error: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl FailureRecord {
    fn from_failure(failure: &Failure) -> Self {
        let suggestions = if failure.kind == FailureKind::BotDetected {
            BOT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };

        Self {
            success: false,
            error: failure.kind,
            message: failure_message(failure),
            video_id: None,
            query: None,
            suggestions,
        }
    }

    /// Rejected request parameters, before any identifier could be parsed
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: FailureKind::InvalidInput,
            message: message.into(),
            video_id: None,
            query: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

impl OutputRecord {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// HTTP status for this record
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Media(_) | Self::Search(_) => 200,
            Self::Failure(record) => match record.error {
                FailureKind::InvalidInput => 400,
                FailureKind::BotDetected => 403,
                FailureKind::Transient | FailureKind::ClientRejected | FailureKind::Fatal => 500,
            },
        }
    }

    /// Pretty JSON body
    pub fn to_json(&self) -> String {
        // Every field is a string, number, bool or nested record of those
        serde_json::to_string_pretty(self).unwrap_or_else(|_| {
            r#"{"success": false, "error": "fatal", "message": "Serialization failed"}"#.to_string()
        })
    }
}

impl From<FailureRecord> for OutputRecord {
    fn from(record: FailureRecord) -> Self {
        Self::Failure(record)
    }
}

pub fn normalize(identifier: &Identifier, outcome: &ResolutionOutcome) -> OutputRecord {
    match outcome {
        ResolutionOutcome::Resolved(media) => OutputRecord::Media(MediaRecord {
            success: true,
            video_id: media.id.clone(),
            title: media.title.clone(),
            duration: media.duration,
            duration_string: media
                .duration_string
                .clone()
                .or_else(|| media.duration.map(format_duration)),
            artist: media.artist.clone(),
            thumbnail: media.thumbnail.clone(),
            view_count: media.view_count,
            download_url: media.chosen.url.clone(),
            best_format: media.chosen.clone(),
            available_formats: media.top.clone(),
        }),
        ResolutionOutcome::Failed(failure) => OutputRecord::Failure(
            FailureRecord::from_failure(failure).with_video_id(identifier.original()),
        ),
    }
}

pub fn normalize_search(query: &SearchQuery, outcome: &SearchOutcome) -> OutputRecord {
    match outcome {
        SearchOutcome::Found(hits) => OutputRecord::Search(SearchRecord {
            success: true,
            query: query.text().to_string(),
            count: hits.len(),
            results: hits.clone(),
        }),
        SearchOutcome::Failed(failure) => OutputRecord::Failure(
            FailureRecord::from_failure(failure).with_query(query.text()),
        ),
    }
}

fn headline(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::InvalidInput => "Invalid request",
        FailureKind::Transient => "Temporary failure reaching the media platform",
        FailureKind::ClientRejected => "The media platform refused every extraction client",
        FailureKind::BotDetected => "The media platform flagged the request as automated",
        FailureKind::Fatal => "The media cannot be resolved",
    }
}

/// User-facing text from kind and reason only
fn failure_message(failure: &Failure) -> String {
    match (failure.reason, failure.kind) {
        (Some(reason), kind) => format!("{}: {}", headline(kind), reason.description()),
        // Locally produced validation text
        (None, FailureKind::InvalidInput) => failure.message.clone(),
        (None, kind) => headline(kind).to_string(),
    }
}

/// `H:MM:SS` past an hour, `M:SS` otherwise
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
