// Scripted extraction client for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::errors::{ExtractError, FailureKind};
use super::extractors::{ExtractTarget, ExtractionClient};
use super::models::{RawExtraction, RawFormat};
use super::profiles::Profile;

type Scripted = Result<RawExtraction, ExtractError>;

/// Returns canned results keyed by target expression or profile name and
/// records every call as `(profile, target)`.
pub struct ScriptedClient {
    by_target: HashMap<String, Scripted>,
    by_profile: HashMap<String, Scripted>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            by_target: HashMap::new(),
            by_profile: HashMap::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn on_profile(mut self, profile: &str, result: Scripted) -> Self {
        self.by_profile.insert(profile.to_string(), result);
        self
    }

    pub fn on_target(mut self, target: &str, result: Scripted) -> Self {
        self.by_target.insert(target.to_string(), result);
        self
    }

    pub fn delay(mut self, target: &str, delay: Duration) -> Self {
        self.delays.insert(target.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract(
        &self,
        target: &ExtractTarget,
        profile: &Profile,
    ) -> Result<RawExtraction, ExtractError> {
        let expression = target.expression();
        self.calls
            .lock()
            .unwrap()
            .push((profile.name.clone(), expression.clone()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&expression) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.by_target
            .get(&expression)
            .or_else(|| self.by_profile.get(&profile.name))
            .cloned()
            .unwrap_or_else(|| {
                Err(ExtractError::new(
                    FailureKind::Transient,
                    format!("unscripted call for {}", expression),
                ))
            })
    }
}

pub fn profiles(names: &[&str]) -> Vec<Profile> {
    names.iter().map(|name| Profile::new(*name)).collect()
}

pub fn audio_format(id: &str, abr: f64) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        ext: Some("m4a".to_string()),
        acodec: Some("mp4a.40.2".to_string()),
        vcodec: Some("none".to_string()),
        abr: Some(abr),
        url: Some(format!("https://cdn.example/{}", id)),
        ..Default::default()
    }
}

pub fn extraction(id: &str, formats: Vec<RawFormat>) -> RawExtraction {
    RawExtraction {
        id: Some(id.to_string()),
        title: Some(format!("Title {}", id)),
        duration: Some(215.0),
        uploader: Some("Uploader".to_string()),
        formats,
        ..Default::default()
    }
}

pub fn failure(kind: FailureKind) -> Scripted {
    Err(ExtractError::new(kind, format!("scripted {}", kind)))
}
