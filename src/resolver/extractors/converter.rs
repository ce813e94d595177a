// Conversion API backend - delegates extraction to a third-party HTTP service
//
// The service is expected to answer `GET <endpoint>?url=<canonical>` with a
// yt-dlp shaped JSON document. Search is not offered by these services.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::diagnostics::{BlockingReason, FailureClassifier};
use super::traits::{ExtractTarget, ExtractionClient};
use crate::resolver::errors::{ConfigError, ExtractError, FailureKind};
use crate::resolver::models::RawExtraction;
use crate::resolver::profiles::Profile;

/// Credentials and location of the conversion service
#[derive(Clone, PartialEq, Eq)]
pub struct ConverterCredentials {
    pub endpoint: String,
    pub api_key: String,
    pub api_host: Option<String>,
}

// The key never reaches logs
impl std::fmt::Debug for ConverterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterCredentials")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_host", &self.api_host)
            .finish()
    }
}

pub struct ConverterApiClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    api_host: Option<String>,
    classifier: Arc<FailureClassifier>,
}

impl ConverterApiClient {
    pub fn new(
        credentials: &ConverterCredentials,
        timeout: Duration,
        proxy: Option<&str>,
        classifier: Arc<FailureClassifier>,
    ) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&credentials.endpoint).map_err(|_| ConfigError::InvalidValue {
            var: "CONVERTER_API_URL",
            value: credentials.endpoint.clone(),
        })?;

        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            http: builder.build()?,
            endpoint,
            api_key: credentials.api_key.clone(),
            api_host: credentials.api_host.clone(),
            classifier,
        })
    }

    fn request_url(&self, url: &str, quality: &str) -> Url {
        let mut request = self.endpoint.clone();
        request
            .query_pairs_mut()
            .append_pair("url", url)
            .append_pair("quality", quality);
        request
    }

    fn transport_error(err: reqwest::Error) -> ExtractError {
        if err.is_timeout() {
            return ExtractError::new(FailureKind::Transient, "Conversion service timed out")
                .with_reason(BlockingReason::NetworkTimeout);
        }
        ExtractError::new(
            FailureKind::Transient,
            format!("Conversion service unreachable: {}", err.without_url()),
        )
        .with_reason(BlockingReason::NetworkTimeout)
    }

    fn status_error(&self, status: StatusCode, body: &str) -> ExtractError {
        let detail = error_text(body).unwrap_or_else(|| status.to_string());
        let (kind, reason) = match status.as_u16() {
            400 => (FailureKind::InvalidInput, BlockingReason::InvalidUrl),
            401 | 403 => (FailureKind::ClientRejected, BlockingReason::Http403Forbidden),
            404 | 410 => (FailureKind::Fatal, BlockingReason::VideoUnavailable),
            429 => (FailureKind::BotDetected, BlockingReason::RateLimited),
            500..=599 => (FailureKind::Transient, BlockingReason::Unknown),
            _ => return self.classifier.to_error(&detail),
        };
        ExtractError::new(kind, detail).with_reason(reason)
    }
}

/// `error` or `message` string from a JSON error body
fn error_text(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| json[*key].as_str().map(str::to_string))
}

#[async_trait]
impl ExtractionClient for ConverterApiClient {
    fn name(&self) -> &'static str {
        "converter-api"
    }

    async fn extract(
        &self,
        target: &ExtractTarget,
        profile: &Profile,
    ) -> Result<RawExtraction, ExtractError> {
        let (url, quality) = match target {
            ExtractTarget::Direct { url, quality } => (url, quality),
            ExtractTarget::Search { .. } => {
                return Err(ExtractError::new(
                    FailureKind::ClientRejected,
                    "Search is not supported by this backend",
                ))
            }
        };

        let mut request = self
            .http
            .get(self.request_url(url, quality.as_str()))
            .header("X-RapidAPI-Key", &self.api_key);
        if let Some(host) = &self.api_host {
            request = request.header("X-RapidAPI-Host", host);
        }
        for (name, value) in &profile.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(Self::transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::transport_error)?;

        if !status.is_success() {
            return Err(self.status_error(status, &body));
        }

        // Some services answer 200 with an error object
        let raw: RawExtraction = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(e) => {
                return Err(match error_text(&body) {
                    Some(text) => self.classifier.to_error(&text),
                    None => ExtractError::new(
                        FailureKind::Transient,
                        format!("Invalid JSON from conversion service: {}", e),
                    ),
                })
            }
        };

        if raw.url.is_none() && raw.formats.is_empty() {
            if let Some(text) = error_text(&body) {
                return Err(self.classifier.to_error(&text));
            }
        }

        Ok(raw)
    }
}
