// FormatSelector - picks the stream to hand out
//
// Ranking policy:
// - audio: audio-only streams by bitrate, falling back to the general URL
// - video/best: the general URL when the platform reports one, otherwise
//   resolution then bitrate
// Candidates without an absolute http(s) URL never make it into a selection.

use std::cmp::Ordering;
use thiserror::Error;
use url::Url;

use super::models::{QualityHint, RawExtraction, RawFormat, SelectedFormat};

/// Candidates returned for the audio hint
pub const AUDIO_TOP_N: usize = 5;

/// Candidates returned for the video and best hints
pub const VIDEO_TOP_N: usize = 15;

/// Chosen format plus ranked alternatives
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub chosen: SelectedFormat,
    pub top: Vec<SelectedFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no playable format")]
pub struct NoPlayableFormat;

/// Format selector with explicit ranking policy
pub struct FormatSelector;

impl FormatSelector {
    pub fn select(
        extraction: &RawExtraction,
        quality: QualityHint,
    ) -> Result<Selection, NoPlayableFormat> {
        let candidates = Self::playable(&extraction.formats);
        let general_url = usable_url(extraction.url.as_deref());

        match quality {
            QualityHint::Audio => Self::select_audio(candidates, general_url, extraction),
            QualityHint::Video | QualityHint::Best => {
                Self::select_video(candidates, general_url, extraction)
            }
        }
    }

    /// Formats paired with their validated URL
    fn playable(formats: &[RawFormat]) -> Vec<(&RawFormat, &str)> {
        formats
            .iter()
            .filter_map(|f| usable_url(f.url.as_deref()).map(|url| (f, url)))
            .collect()
    }

    fn select_audio(
        candidates: Vec<(&RawFormat, &str)>,
        general_url: Option<&str>,
        extraction: &RawExtraction,
    ) -> Result<Selection, NoPlayableFormat> {
        let mut audio: Vec<(&RawFormat, &str)> = candidates
            .into_iter()
            .filter(|(f, _)| f.is_audio_only())
            .collect();

        // Stable: equal bitrates keep upstream order
        audio.sort_by(|(a, _), (b, _)| audio_bitrate(b).total_cmp(&audio_bitrate(a)));

        let top: Vec<SelectedFormat> = audio
            .iter()
            .take(AUDIO_TOP_N)
            .map(|(f, url)| SelectedFormat::from_raw(f, url))
            .collect();

        if let Some(chosen) = top.first().cloned() {
            return Ok(Selection { chosen, top });
        }

        general_url
            .map(|url| Selection {
                chosen: SelectedFormat::synthetic(url, extraction.ext.as_deref()),
                top: Vec::new(),
            })
            .ok_or(NoPlayableFormat)
    }

    fn select_video(
        mut candidates: Vec<(&RawFormat, &str)>,
        general_url: Option<&str>,
        extraction: &RawExtraction,
    ) -> Result<Selection, NoPlayableFormat> {
        candidates.sort_by(|(a, _), (b, _)| rank_video(a, b));

        let top: Vec<SelectedFormat> = candidates
            .iter()
            .take(VIDEO_TOP_N)
            .map(|(f, url)| SelectedFormat::from_raw(f, url))
            .collect();

        if let Some(url) = general_url {
            let matching = candidates.iter().find(|(f, candidate_url)| {
                *candidate_url == url
                    || extraction
                        .format_id
                        .as_deref()
                        .map_or(false, |id| id == f.format_id)
            });

            let chosen = match matching {
                Some((f, _)) => SelectedFormat::from_raw(f, url),
                None => SelectedFormat::synthetic(url, extraction.ext.as_deref()),
            };
            return Ok(Selection { chosen, top });
        }

        top.first()
            .cloned()
            .map(|chosen| Selection { chosen, top })
            .ok_or(NoPlayableFormat)
    }
}

fn audio_bitrate(format: &RawFormat) -> f64 {
    format.abr.unwrap_or(0.0)
}

fn total_bitrate(format: &RawFormat) -> f64 {
    format.tbr.or(format.abr).unwrap_or(0.0)
}

/// Higher resolution, then higher bitrate, then muxed audio+video first
fn rank_video(a: &RawFormat, b: &RawFormat) -> Ordering {
    let muxed = |f: &RawFormat| f.has_audio() && f.has_video();

    b.height
        .unwrap_or(0)
        .cmp(&a.height.unwrap_or(0))
        .then_with(|| total_bitrate(b).total_cmp(&total_bitrate(a)))
        .then_with(|| muxed(b).cmp(&muxed(a)))
}

/// Absolute http(s) URL with a host, or nothing
fn usable_url(url: Option<&str>) -> Option<&str> {
    let raw = url?.trim();
    let parsed = Url::parse(raw).ok()?;
    if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() {
        Some(raw)
    } else {
        None
    }
}
