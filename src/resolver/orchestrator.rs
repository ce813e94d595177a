// Fallback resolver - drives the profile chain
//
// Strategy:
// 1. Try each profile in declared order, one bounded attempt each
// 2. Transient / ClientRejected / BotDetected: record and move on
// 3. Fatal / InvalidInput: stop immediately
// 4. On exhaustion: BotDetected only if every attempt was blocked,
//    otherwise the most recent non-bot failure

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use super::errors::{ExtractError, FailureKind};
use super::extractors::{ExtractTarget, ExtractionClient};
use super::format_selector::{FormatSelector, Selection};
use super::models::{
    Attempt, Failure, Identifier, QualityHint, RawExtraction, ResolutionOutcome, ResolvedMedia,
    SearchHit, SearchOutcome, SearchQuery, WATCH_URL_PREFIX,
};
use super::profiles::Profile;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of concurrent per-entry lookups in a search
pub const DEFAULT_LINK_CONCURRENCY: usize = 4;

pub struct FallbackResolver {
    client: Arc<dyn ExtractionClient>,
    timeout: Duration,
    link_concurrency: usize,
}

impl FallbackResolver {
    pub fn new(client: Arc<dyn ExtractionClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            link_concurrency: DEFAULT_LINK_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_link_concurrency(mut self, limit: usize) -> Self {
        self.link_concurrency = limit.max(1);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.name()
    }

    /// Resolve one identifier through the chain
    pub async fn resolve(
        &self,
        identifier: &Identifier,
        profiles: &[Profile],
        quality: QualityHint,
    ) -> ResolutionOutcome {
        let target = ExtractTarget::Direct {
            url: identifier.canonical().to_string(),
            quality,
        };

        let result = self
            .run_chain(&target, profiles, |raw| {
                let selection = FormatSelector::select(&raw, quality)
                    .map_err(|_| ExtractError::no_playable_format())?;
                Ok(build_media(identifier, raw, selection))
            })
            .await;

        match result {
            Ok(media) => ResolutionOutcome::Resolved(media),
            Err(failure) => ResolutionOutcome::Failed(failure),
        }
    }

    /// Search, optionally resolving an audio link for every entry
    pub async fn search(
        &self,
        query: &SearchQuery,
        profiles: &[Profile],
        link_profiles: Option<&[Profile]>,
    ) -> SearchOutcome {
        let target = ExtractTarget::Search {
            query: query.text().to_string(),
            limit: query.limit(),
        };

        let entries = match self
            .run_chain(&target, profiles, |raw| Ok(raw.entries))
            .await
        {
            Ok(entries) => entries,
            Err(failure) => return SearchOutcome::Failed(failure),
        };

        let hits: Vec<SearchHit> = entries
            .into_iter()
            .filter_map(search_hit)
            .take(query.limit())
            .collect();

        tracing::info!(query = query.text(), count = hits.len(), "search returned");

        let Some(link_profiles) = link_profiles else {
            return SearchOutcome::Found(hits);
        };

        // `buffered` yields in input order, so ranking survives the fan-out
        let hits: Vec<SearchHit> = stream::iter(hits)
            .map(|hit| self.attach_link(hit, link_profiles))
            .buffered(self.link_concurrency)
            .collect()
            .await;

        SearchOutcome::Found(hits)
    }

    async fn attach_link(&self, mut hit: SearchHit, profiles: &[Profile]) -> SearchHit {
        let identifier = match Identifier::parse(Some(hit.url.as_str()), Some(hit.id.as_str())) {
            Ok(identifier) => identifier,
            Err(e) => {
                tracing::warn!(entry = %hit.id, "skipping link lookup: {}", e);
                return hit;
            }
        };

        match self.resolve(&identifier, profiles, QualityHint::Audio).await {
            ResolutionOutcome::Resolved(media) => hit.download_url = Some(media.chosen.url),
            ResolutionOutcome::Failed(failure) => {
                tracing::warn!(
                    entry = %hit.id,
                    kind = %failure.kind,
                    "no download link for search entry"
                );
            }
        }
        hit
    }

    /// Try `profiles` in order until `accept` takes an extraction result
    async fn run_chain<T, F>(
        &self,
        target: &ExtractTarget,
        profiles: &[Profile],
        mut accept: F,
    ) -> Result<T, Failure>
    where
        F: FnMut(RawExtraction) -> Result<T, ExtractError>,
    {
        if profiles.is_empty() {
            return Err(Failure::new(
                FailureKind::Fatal,
                "No extraction profiles configured",
            ));
        }

        let mut attempts = Vec::with_capacity(profiles.len());

        for profile in profiles {
            tracing::info!(
                profile = %profile.name,
                backend = self.client.name(),
                "attempting {}",
                target
            );

            let result = match tokio::time::timeout(
                self.timeout,
                self.client.extract(target, profile),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExtractError::timeout(self.timeout)),
            };

            let err = match result.and_then(&mut accept) {
                Ok(value) => {
                    tracing::info!(profile = %profile.name, "attempt succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            tracing::warn!(
                profile = %profile.name,
                kind = %err.kind,
                reason = ?err.reason,
                "attempt failed: {}",
                err.message
            );

            let stop = !err.kind.is_retryable();
            attempts.push(Attempt {
                profile: profile.name.clone(),
                kind: err.kind,
                reason: err.reason,
                message: err.message,
            });

            if stop {
                return Err(terminal(attempts));
            }
        }

        Err(exhausted(attempts))
    }
}

/// Failure after a non-retryable attempt
fn terminal(attempts: Vec<Attempt>) -> Failure {
    let last = attempts.last().cloned();
    decided_by(last, attempts)
}

/// Every profile failed with a retryable kind
fn exhausted(attempts: Vec<Attempt>) -> Failure {
    let decisive = attempts
        .iter()
        .rev()
        .find(|a| a.kind != FailureKind::BotDetected)
        .or_else(|| attempts.last())
        .cloned();
    decided_by(decisive, attempts)
}

fn decided_by(decisive: Option<Attempt>, attempts: Vec<Attempt>) -> Failure {
    match decisive {
        Some(attempt) => Failure {
            kind: attempt.kind,
            reason: attempt.reason,
            message: attempt.message,
            attempts,
        },
        None => Failure::new(FailureKind::Fatal, "No attempts recorded"),
    }
}

fn build_media(identifier: &Identifier, raw: RawExtraction, selection: Selection) -> ResolvedMedia {
    ResolvedMedia {
        id: raw
            .id
            .clone()
            .unwrap_or_else(|| identifier.original().to_string()),
        title: raw.title.clone(),
        duration: raw.duration,
        duration_string: raw.duration_string.clone(),
        artist: raw.display_artist(),
        thumbnail: raw.best_thumbnail(),
        view_count: raw.view_count,
        chosen: selection.chosen,
        top: selection.top,
    }
}

/// Lightweight search entry, skipped when it has no id
fn search_hit(entry: RawExtraction) -> Option<SearchHit> {
    let id = entry.id.clone()?;
    let url = entry
        .webpage_url
        .clone()
        .or_else(|| entry.url.clone())
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .unwrap_or_else(|| format!("{}{}", WATCH_URL_PREFIX, id));

    Some(SearchHit {
        thumbnail: entry.best_thumbnail(),
        channel: entry.uploader.clone().or_else(|| entry.channel.clone()),
        id,
        title: entry.title,
        url,
        duration: entry.duration,
        view_count: entry.view_count,
        download_url: None,
    })
}
