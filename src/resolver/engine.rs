// Engine - backend plus profile catalog, built once per process

use std::sync::Arc;

use super::config::{Backend, Settings};
use super::errors::ConfigError;
use super::extractors::{ConverterApiClient, ExtractionClient, YtDlpClient, YtDlpCommand};
use super::models::{Identifier, QualityHint, ResolutionOutcome, SearchOutcome, SearchQuery};
use super::orchestrator::FallbackResolver;
use super::profiles::ProfileCatalog;

pub struct Engine {
    resolver: FallbackResolver,
    catalog: ProfileCatalog,
}

impl Engine {
    pub fn new(resolver: FallbackResolver, catalog: ProfileCatalog) -> Self {
        Self { resolver, catalog }
    }

    /// Build the configured backend, install cookies, load catalog and classifier
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let classifier = Arc::new(settings.load_classifier()?);
        let catalog = settings.load_catalog()?;

        let client: Arc<dyn ExtractionClient> = match settings.backend {
            Backend::YtDlp => {
                let command = YtDlpCommand::detect(
                    settings.ytdlp_python.as_deref(),
                    settings.ytdlp_path.as_deref(),
                );
                Arc::new(
                    YtDlpClient::new(command, classifier)
                        .with_proxy(settings.proxy.clone())
                        .with_timeout(settings.timeout.as_secs()),
                )
            }
            Backend::ConverterApi => {
                let credentials = settings
                    .converter
                    .as_ref()
                    .ok_or(ConfigError::Missing("CONVERTER_API_URL"))?;
                Arc::new(ConverterApiClient::new(
                    credentials,
                    settings.timeout,
                    settings.proxy.as_deref(),
                    classifier,
                )?)
            }
        };

        tracing::info!(
            backend = client.name(),
            direct = catalog.direct.len(),
            search = catalog.search.len(),
            entry_links = catalog.entry_links.len(),
            "engine ready"
        );

        let resolver = FallbackResolver::new(client)
            .with_timeout(settings.timeout)
            .with_link_concurrency(settings.link_concurrency);

        Ok(Self::new(resolver, catalog))
    }

    pub fn backend_name(&self) -> &'static str {
        self.resolver.backend_name()
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Resolve over the `direct` chain
    pub async fn resolve(&self, identifier: &Identifier, quality: QualityHint) -> ResolutionOutcome {
        self.resolver
            .resolve(identifier, &self.catalog.direct, quality)
            .await
    }

    /// Search over the `search` chain, with per-entry links over `entry_links`
    pub async fn search(&self, query: &SearchQuery, with_links: bool) -> SearchOutcome {
        let links = with_links.then_some(self.catalog.entry_links.as_slice());
        self.resolver
            .search(query, &self.catalog.search, links)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::errors::FailureKind;
    use crate::resolver::extractors::ConverterCredentials;
    use crate::resolver::models::RawExtraction;
    use crate::resolver::testing::{audio_format, extraction, failure, ScriptedClient};

    fn engine(client: &Arc<ScriptedClient>) -> Engine {
        Engine::new(
            FallbackResolver::new(client.clone()),
            ProfileCatalog::builtin(),
        )
    }

    #[tokio::test]
    async fn test_resolve_walks_direct_chain() {
        let client = Arc::new(
            ScriptedClient::new()
                .on_profile("ios-mobile", failure(FailureKind::ClientRejected))
                .on_profile("mobile-apps", failure(FailureKind::BotDetected))
                .on_profile("android", Ok(extraction("abc123", vec![audio_format("140", 128.0)]))),
        );

        let ident = Identifier::from_id("abc123").unwrap();
        let outcome = engine(&client).resolve(&ident, QualityHint::Audio).await;

        assert!(outcome.is_resolved());
        let profiles: Vec<String> = client.calls().into_iter().map(|(p, _)| p).collect();
        assert_eq!(profiles, vec!["ios-mobile", "mobile-apps", "android"]);
    }

    #[tokio::test]
    async fn test_search_uses_entry_link_chain() {
        let listing = RawExtraction {
            entries: vec![RawExtraction {
                id: Some("aaa".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let client = Arc::new(
            ScriptedClient::new()
                .on_profile("default-search", Ok(listing))
                .on_profile("android-ios", Ok(extraction("aaa", vec![audio_format("251", 160.0)]))),
        );

        let query = SearchQuery::new(Some("test song"), Some(1)).unwrap();
        let outcome = engine(&client).search(&query, true).await;

        match outcome {
            SearchOutcome::Found(hits) => {
                assert_eq!(hits[0].download_url.as_deref(), Some("https://cdn.example/251"));
            }
            other => panic!("expected hits, got {:?}", other),
        }
        assert_eq!(client.call_count(), 2);
    }

    #[test]
    fn test_from_settings_converter_backend() {
        let settings = Settings::default()
            .with_backend(Backend::ConverterApi)
            .with_converter(Some(ConverterCredentials {
                endpoint: "https://converter.example/info".to_string(),
                api_key: "key".to_string(),
                api_host: None,
            }));

        let engine = Engine::from_settings(&settings).unwrap();
        assert_eq!(engine.backend_name(), "converter-api");
        assert_eq!(engine.catalog().direct.len(), 4);
    }

    #[test]
    fn test_from_settings_missing_credentials() {
        let settings = Settings::default().with_backend(Backend::ConverterApi);
        assert!(matches!(
            Engine::from_settings(&settings),
            Err(ConfigError::Missing(_))
        ));
    }
}
