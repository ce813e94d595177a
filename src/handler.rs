// Request adapter - query parameters in, status + JSON body out
//
// Transport-agnostic: callers hand over the method and the request target
// (`/api/audio?id=...`) and write the returned response wherever they like.

use std::collections::HashMap;
use url::Url;

use crate::resolver::normalizer::{normalize, normalize_search, FailureRecord, OutputRecord};
use crate::resolver::models::MAX_SEARCH_RESULTS;
use crate::resolver::{Engine, Identifier, QualityHint, SearchQuery};

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    fn with_cors(status: u16, body: String) -> Self {
        let headers = CORS_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    fn preflight() -> Self {
        Self::with_cors(200, String::new())
    }

    fn json(status: u16, body: String) -> Self {
        let mut response = Self::with_cors(status, body);
        response
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        response
    }

    fn record(record: &OutputRecord) -> Self {
        Self::json(record.status_code(), record.to_json())
    }

    fn not_found(path: &str) -> Self {
        let body = serde_json::json!({
            "success": false,
            "error": "not_found",
            "message": format!("No route for {}", path),
        });
        Self::json(
            404,
            serde_json::to_string_pretty(&body).unwrap_or_default(),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Params = HashMap<String, String>;

/// Non-blank query parameter
fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Handle one request
pub async fn handle(engine: &Engine, method: &str, target: &str) -> HttpResponse {
    if method.eq_ignore_ascii_case("OPTIONS") {
        return HttpResponse::preflight();
    }

    let url = match Url::parse("http://localhost/").and_then(|base| base.join(target)) {
        Ok(url) => url,
        Err(e) => {
            let record = FailureRecord::invalid_input(format!("Malformed request target: {}", e));
            return HttpResponse::record(&record.into());
        }
    };
    let params: Params = url.query_pairs().into_owned().collect();
    let path = url.path().trim_end_matches('/');

    tracing::info!(method, path, "request");

    let record = match path {
        "/api/audio" => resolve_route(engine, &params, Some(QualityHint::Audio)).await,
        "/api/download" => resolve_route(engine, &params, None).await,
        "/api/search" => search_route(engine, &params, false).await,
        "/api/music" => search_route(engine, &params, true).await,
        "/api/resolve" => unified_route(engine, &params).await,
        _ => return HttpResponse::not_found(url.path()),
    };

    HttpResponse::record(&record)
}

async fn resolve_route(
    engine: &Engine,
    params: &Params,
    forced: Option<QualityHint>,
) -> OutputRecord {
    let (url, id) = (param(params, "url"), param(params, "id"));

    let identifier = match Identifier::parse(url, id) {
        Ok(identifier) => identifier,
        Err(e) => {
            let mut record = FailureRecord::invalid_input(e.to_string());
            if let Some(original) = id.or(url) {
                record = record.with_video_id(original);
            }
            return record.into();
        }
    };

    let quality = match (forced, param(params, "quality")) {
        (Some(quality), _) => quality,
        (None, None) => QualityHint::default(),
        (None, Some(value)) => match value.parse::<QualityHint>() {
            Ok(quality) => quality,
            Err(e) => {
                return FailureRecord::invalid_input(e.to_string())
                    .with_video_id(identifier.original())
                    .into()
            }
        },
    };

    let outcome = engine.resolve(&identifier, quality).await;
    normalize(&identifier, &outcome)
}

async fn search_route(engine: &Engine, params: &Params, with_links: bool) -> OutputRecord {
    let text = param(params, "q");

    let limit = match param(params, "max").map(str::parse::<i64>) {
        None => None,
        Some(Ok(n)) => Some(n.clamp(0, MAX_SEARCH_RESULTS as i64) as usize),
        Some(Err(_)) => {
            let mut record =
                FailureRecord::invalid_input("Parameter \"max\" must be an integer");
            if let Some(text) = text {
                record = record.with_query(text);
            }
            return record.into();
        }
    };

    let query = match SearchQuery::new(text, limit) {
        Ok(query) => query,
        Err(e) => return FailureRecord::invalid_input(e.to_string()).into(),
    };

    let outcome = engine.search(&query, with_links).await;
    normalize_search(&query, &outcome)
}

/// `url|id` resolves, `q` searches with links
async fn unified_route(engine: &Engine, params: &Params) -> OutputRecord {
    if param(params, "url").is_some() || param(params, "id").is_some() {
        resolve_route(engine, params, None).await
    } else if param(params, "q").is_some() {
        search_route(engine, params, true).await
    } else {
        FailureRecord::invalid_input("Missing parameter \"url\", \"id\" or \"q\"").into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::errors::FailureKind;
    use crate::resolver::extractors::BlockingReason;
    use crate::resolver::models::{RawExtraction, RawFormat};
    use crate::resolver::testing::{audio_format, extraction, ScriptedClient};
    use crate::resolver::{ExtractError, FallbackResolver, ProfileCatalog};
    use std::sync::Arc;

    fn engine(client: &Arc<ScriptedClient>) -> Engine {
        Engine::new(
            FallbackResolver::new(client.clone()),
            ProfileCatalog::builtin(),
        )
    }

    fn body(response: &HttpResponse) -> serde_json::Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let client = Arc::new(ScriptedClient::new());
        let response = handle(&engine(&client), "OPTIONS", "/api/audio").await;

        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("Access-Control-Allow-Methods"),
            Some("GET, POST, OPTIONS")
        );
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_400() {
        let client = Arc::new(ScriptedClient::new());
        let engine = engine(&client);

        for target in ["/api/download", "/api/audio?url=&id=", "/api/resolve"] {
            let response = handle(&engine, "GET", target).await;
            assert_eq!(response.status, 400, "{}", target);
            let json = body(&response);
            assert_eq!(json["success"], false);
            assert_eq!(json["error"], "invalid_input");
        }
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_query_and_bad_max() {
        let client = Arc::new(ScriptedClient::new());
        let engine = engine(&client);

        let response = handle(&engine, "GET", "/api/search?max=3").await;
        assert_eq!(response.status, 400);

        let response = handle(&engine, "GET", "/api/music?q=test&max=ten").await;
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["query"], "test");
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_quality_is_400() {
        let client = Arc::new(ScriptedClient::new());
        let response = handle(&engine(&client), "GET", "/api/download?id=abc123&quality=720p").await;
        assert_eq!(response.status, 400);
        assert_eq!(body(&response)["video_id"], "abc123");
    }

    #[tokio::test]
    async fn test_download_route_parses_quality() {
        let video = RawFormat {
            format_id: "22".to_string(),
            ext: Some("mp4".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            vcodec: Some("avc1.64001F".to_string()),
            height: Some(720),
            url: Some("https://cdn.example/22".to_string()),
            ..Default::default()
        };
        let client = Arc::new(
            ScriptedClient::new().on_profile("ios-mobile", Ok(extraction("abc123", vec![video]))),
        );

        let response =
            handle(&engine(&client), "GET", "/api/download?id=abc123&quality=Video").await;
        assert_eq!(response.status, 200);
        let json = body(&response);
        assert_eq!(json["success"], true);
        assert_eq!(json["download_url"], "https://cdn.example/22");
    }

    #[tokio::test]
    async fn test_oversized_max_is_clamped() {
        let listing = RawExtraction {
            entries: vec![RawExtraction {
                id: Some("aaa".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let client = Arc::new(ScriptedClient::new().on_target("ytsearch20:test", Ok(listing)));

        let response =
            handle(&engine(&client), "GET", "/api/search?q=test&max=99999999999").await;
        assert_eq!(response.status, 200);
        assert_eq!(body(&response)["count"], 1);
        assert_eq!(client.calls()[0].1, "ytsearch20:test");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let client = Arc::new(ScriptedClient::new());
        let response = handle(&engine(&client), "GET", "/api/nope").await;
        assert_eq!(response.status, 404);
        assert_eq!(body(&response)["success"], false);
    }

    #[tokio::test]
    async fn test_audio_route_resolves() {
        let client = Arc::new(ScriptedClient::new().on_profile(
            "ios-mobile",
            Ok(extraction(
                "abc123",
                vec![audio_format("139", 128.0), audio_format("140", 192.0)],
            )),
        ));

        let response = handle(&engine(&client), "GET", "/api/audio?id=abc123").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/json"));

        let json = body(&response);
        assert_eq!(json["success"], true);
        assert_eq!(json["video_id"], "abc123");
        assert_eq!(json["download_url"], "https://cdn.example/140");
        assert_eq!(json["available_formats"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bot_detection_is_403() {
        let bot = || {
            Err(ExtractError::new(FailureKind::BotDetected, "Sign in to confirm you're not a bot")
                .with_reason(BlockingReason::BotDetection))
        };
        let client = Arc::new(
            ScriptedClient::new()
                .on_profile("ios-mobile", bot())
                .on_profile("mobile-apps", bot())
                .on_profile("android", bot())
                .on_profile("web-cookies", bot()),
        );

        let response = handle(&engine(&client), "GET", "/api/download?url=https://youtu.be/abc123").await;
        assert_eq!(response.status, 403);
        let json = body(&response);
        assert_eq!(json["error"], "bot_detected");
        assert_eq!(json["video_id"], "https://youtu.be/abc123");
        assert_eq!(json["suggestions"][0], "Wait 5-10 minutes and try again");
        assert!(!response.body.contains("ios-mobile"));
    }

    #[tokio::test]
    async fn test_unified_route_searches() {
        let listing = RawExtraction {
            entries: vec![RawExtraction {
                id: Some("aaa".to_string()),
                title: Some("Test Song".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let client = Arc::new(
            ScriptedClient::new()
                .on_target("ytsearch3:test song", Ok(listing))
                .on_profile("android-ios", Ok(extraction("aaa", vec![audio_format("140", 128.0)]))),
        );

        let response = handle(&engine(&client), "GET", "/api/resolve?q=test%20song&max=3").await;
        assert_eq!(response.status, 200);
        let json = body(&response);
        assert_eq!(json["query"], "test song");
        assert_eq!(json["count"], 1);
        assert_eq!(json["results"][0]["download_url"], "https://cdn.example/140");
    }
}
