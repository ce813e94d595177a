// ExtractionClient trait and request types

use async_trait::async_trait;
use std::fmt;

use crate::resolver::errors::ExtractError;
use crate::resolver::models::{QualityHint, RawExtraction};
use crate::resolver::profiles::Profile;

/// What a single extraction attempt should fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractTarget {
    /// Metadata and formats for one canonical URL
    Direct { url: String, quality: QualityHint },

    /// Ordered lightweight entries for a free-text query
    Search { query: String, limit: usize },
}

impl ExtractTarget {
    /// Expression understood by yt-dlp (`ytsearchN:` for searches)
    pub fn expression(&self) -> String {
        match self {
            Self::Direct { url, .. } => url.clone(),
            Self::Search { query, limit } => format!("ytsearch{}:{}", limit, query),
        }
    }
}

impl fmt::Display for ExtractTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// One extraction backend. Implementations never retry; the resolver does.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Perform one attempt with the given profile
    async fn extract(
        &self,
        target: &ExtractTarget,
        profile: &Profile,
    ) -> Result<RawExtraction, ExtractError>;
}
