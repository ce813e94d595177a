// Failure diagnostics - classifies upstream error text
//
// Analyzes error messages to determine:
// - Why the platform refused the request (bot check, removed video, etc.)
// - Which FailureKind the fallback chain should act on
//
// Upstream wording is not a contract, so the patterns are data: the built-in
// rule set can be replaced by a JSON file without touching code.

use lazy_static::lazy_static;
use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};

use crate::resolver::errors::{ConfigError, ExtractError, FailureKind};

/// Reasons why an extraction attempt might fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// SABR streaming protection, formats hidden for this client
    SabrStreaming,

    /// PO Token (Proof of Origin) required for this client
    PoTokenRequired,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Network timeout or connection failure
    NetworkTimeout,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// Bot detection triggered
    BotDetection,

    /// Private video requiring authorization
    PrivateVideo,

    /// Video deleted or unavailable
    VideoUnavailable,

    /// DRM-protected content
    DrmProtected,

    /// Member-only content
    MembersOnly,

    /// Identifier not understood by the extractor
    InvalidUrl,

    /// Extraction tool missing on this host
    ToolMissing,

    /// Nothing matched
    Unknown,
}

impl BlockingReason {
    /// Kind the fallback chain acts on
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::BotDetection | Self::RateLimited => FailureKind::BotDetected,
            Self::Http403Forbidden
            | Self::SabrStreaming
            | Self::PoTokenRequired
            | Self::AgeRestricted => FailureKind::ClientRejected,
            Self::NetworkTimeout | Self::Unknown => FailureKind::Transient,
            Self::VideoUnavailable
            | Self::PrivateVideo
            | Self::DrmProtected
            | Self::MembersOnly
            | Self::GeoBlocked
            | Self::ToolMissing => FailureKind::Fatal,
            Self::InvalidUrl => FailureKind::InvalidInput,
        }
    }

    /// Human-readable description, safe to show to end users
    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::SabrStreaming => "Streaming protection hid the available formats",
            Self::PoTokenRequired => "Proof of Origin token required",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Video is not available in this region",
            Self::NetworkTimeout => "Upstream did not respond in time",
            Self::RateLimited => "Rate limited by the platform",
            Self::BotDetection => "Bot detection triggered",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::InvalidUrl => "Identifier not recognized by the platform",
            Self::ToolMissing => "Extraction backend unavailable",
            Self::Unknown => "Extraction failed",
        }
    }
}

/// One ordered classification rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub reason: BlockingReason,
    /// Case-insensitive regular expressions
    pub patterns: Vec<String>,
}

/// Ordered rule list, first match wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRules {
    pub rules: Vec<ClassifierRule>,
}

impl ClassifierRules {
    /// Built-in rules, most specific first
    pub fn builtin() -> Self {
        fn rule(reason: BlockingReason, patterns: &[&str]) -> ClassifierRule {
            ClassifierRule {
                reason,
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
            }
        }

        Self {
            rules: vec![
                rule(
                    BlockingReason::ToolMissing,
                    &[r"no module named '?yt_dlp", r"command not found"],
                ),
                rule(
                    BlockingReason::DrmProtected,
                    &[
                        r"\bdrm\b",
                        r"widevine",
                        r"playready",
                        r"fairplay",
                        r"encrypted media",
                        r"requires (a )?purchase",
                        r"\brental\b",
                        r"youtube (music )?premium",
                        r"this video requires payment",
                    ],
                ),
                rule(
                    BlockingReason::MembersOnly,
                    &[
                        r"members[ -]only",
                        r"join this channel",
                        r"membership required",
                        r"available to members",
                    ],
                ),
                rule(
                    BlockingReason::PrivateVideo,
                    &[
                        r"private video",
                        r"video is private",
                        r"sign in if you've been granted access",
                    ],
                ),
                rule(
                    BlockingReason::VideoUnavailable,
                    &[
                        r"video unavailable",
                        r"video is unavailable",
                        r"video has been removed",
                        r"no longer available",
                        r"account associated with this video has been terminated",
                        r"does not exist",
                    ],
                ),
                rule(
                    BlockingReason::GeoBlocked,
                    &[
                        r"not available in your country",
                        r"blocked in your country",
                        r"geo[- ]?restrict",
                    ],
                ),
                rule(
                    BlockingReason::InvalidUrl,
                    &[
                        r"unsupported url",
                        r"is not a valid url",
                        r"incomplete youtube id",
                        r"invalid url",
                    ],
                ),
                rule(
                    BlockingReason::AgeRestricted,
                    &[
                        r"age[- ]restricted",
                        r"sign in to confirm your age",
                        r"age_verification",
                        r"inappropriate for some users",
                    ],
                ),
                rule(BlockingReason::SabrStreaming, &[r"\bsabr\b"]),
                rule(
                    BlockingReason::PoTokenRequired,
                    &[r"po token", r"proof of origin"],
                ),
                rule(
                    BlockingReason::RateLimited,
                    &[r"\b429\b", r"rate[- ]limit", r"too many requests"],
                ),
                rule(
                    BlockingReason::BotDetection,
                    &[
                        r"not a bot",
                        r"sign in to confirm",
                        r"\bbots?\b",
                        r"captcha",
                        r"unusual traffic",
                        r"automated (access|queries|requests)",
                    ],
                ),
                rule(
                    BlockingReason::Http403Forbidden,
                    &[
                        r"\b403\b",
                        r"forbidden",
                        r"http error 400",
                        r"precondition check failed",
                        r"failed to extract any player response",
                    ],
                ),
                rule(
                    BlockingReason::NetworkTimeout,
                    &[
                        r"timed? ?out",
                        r"connection (refused|reset|aborted)",
                        r"network is unreachable",
                        r"temporary failure in name resolution",
                        r"name or service not known",
                        r"http error 5\d\d",
                        r"remote end closed connection",
                    ],
                ),
            ],
        }
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    reason: BlockingReason,
    patterns: Vec<String>,
    set: RegexSet,
}

/// Compiled, immutable classifier shared by the extraction backends
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    rules: Vec<CompiledRule>,
}

impl FailureClassifier {
    pub fn new(rules: &ClassifierRules) -> Result<Self, ConfigError> {
        let compiled = rules
            .rules
            .iter()
            .map(|rule| {
                let set = RegexSetBuilder::new(&rule.patterns)
                    .case_insensitive(true)
                    .build()?;
                Ok(CompiledRule {
                    reason: rule.reason,
                    patterns: rule.patterns.clone(),
                    set,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { rules: compiled })
    }

    /// Analyze error text and return the blocking reason
    pub fn classify(&self, error: &str) -> BlockingReason {
        self.analyze(error).reason
    }

    /// Full diagnostic analysis of an error
    pub fn analyze(&self, error: &str) -> BlockingDiagnostics {
        let context = extract_context(error);

        for rule in &self.rules {
            let matched: Vec<String> = rule
                .set
                .matches(error)
                .into_iter()
                .map(|i| rule.patterns[i].clone())
                .collect();

            if !matched.is_empty() {
                return BlockingDiagnostics {
                    reason: rule.reason,
                    context,
                    matched_patterns: matched,
                };
            }
        }

        BlockingDiagnostics {
            reason: BlockingReason::Unknown,
            context,
            matched_patterns: Vec::new(),
        }
    }

    /// Turn backend error text into a classified extraction error
    pub fn to_error(&self, error: &str) -> ExtractError {
        let diagnostics = self.analyze(error);
        let message = diagnostics
            .context
            .clone()
            .unwrap_or_else(|| diagnostics.reason.description().to_string());

        ExtractError::new(diagnostics.reason.failure_kind(), message).with_reason(diagnostics.reason)
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        DEFAULT_CLASSIFIER.clone()
    }
}

lazy_static! {
    static ref DEFAULT_CLASSIFIER: FailureClassifier =
        FailureClassifier::new(&ClassifierRules::builtin())
            .expect("built-in classifier patterns must compile");
}

/// Classify with the built-in rules
pub fn diagnose_error(error: &str) -> BlockingReason {
    DEFAULT_CLASSIFIER.classify(error)
}

/// Detailed diagnostics information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingDiagnostics {
    pub reason: BlockingReason,

    /// First useful line of the error output
    pub context: Option<String>,

    /// Patterns of the winning rule that matched
    pub matched_patterns: Vec<String>,
}

fn extract_context(error: &str) -> Option<String> {
    let lines: Vec<&str> = error
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .find(|l| l.to_lowercase().starts_with("error:"))
        .or_else(|| lines.first())
        .map(|l| l.chars().take(300).collect())
}
