// Process configuration from environment variables
//
// Every setting has a builder so tests and embedders can skip the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::errors::ConfigError;
use super::extractors::{ClassifierRules, ConverterCredentials, FailureClassifier};
use super::orchestrator::{DEFAULT_LINK_CONCURRENCY, DEFAULT_TIMEOUT};
use super::profiles::{CookieSource, ProfileCatalog};

/// Which extraction backend answers the requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Local yt-dlp subprocess
    #[default]
    YtDlp,
    /// Third-party conversion HTTP API
    ConverterApi,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ytdlp" | "yt-dlp" => Ok(Self::YtDlp),
            "converter" | "api" => Ok(Self::ConverterApi),
            _ => Err(ConfigError::InvalidValue {
                var: "RESOLVER_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: Backend,
    /// Bound on every extraction attempt
    pub timeout: Duration,
    /// Concurrent per-entry lookups during a search
    pub link_concurrency: usize,
    pub proxy: Option<String>,
    /// Cookie file copied into `cache_dir` at startup
    pub cookies: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// JSON profile catalog replacing the built-in one
    pub profiles_path: Option<PathBuf>,
    /// JSON classifier rules replacing the built-in ones
    pub classifier_path: Option<PathBuf>,
    pub ytdlp_python: Option<String>,
    pub ytdlp_path: Option<String>,
    pub converter: Option<ConverterCredentials>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::YtDlp,
            timeout: DEFAULT_TIMEOUT,
            link_concurrency: DEFAULT_LINK_CONCURRENCY,
            proxy: None,
            cookies: None,
            cache_dir: CookieSource::default_cache_dir(),
            profiles_path: None,
            classifier_path: None,
            ytdlp_python: None,
            ytdlp_path: None,
            converter: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source, blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Self::default();

        if let Some(value) = get("RESOLVER_BACKEND") {
            settings.backend = value.parse()?;
        }
        if let Some(value) = get("RESOLVER_TIMEOUT_SECS") {
            settings.timeout = Duration::from_secs(parse_positive("RESOLVER_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = get("RESOLVER_LINK_CONCURRENCY") {
            settings.link_concurrency =
                parse_positive("RESOLVER_LINK_CONCURRENCY", &value)? as usize;
        }

        settings.proxy = get("RESOLVER_PROXY");
        settings.cookies = get("RESOLVER_COOKIES").map(PathBuf::from);
        settings.profiles_path = get("RESOLVER_PROFILES").map(PathBuf::from);
        settings.classifier_path = get("RESOLVER_CLASSIFIER").map(PathBuf::from);
        settings.ytdlp_python = get("YTDLP_PYTHON");
        settings.ytdlp_path = get("YTDLP_PATH");

        if let Some(endpoint) = get("CONVERTER_API_URL") {
            settings.converter = Some(ConverterCredentials {
                endpoint,
                api_key: get("CONVERTER_API_KEY")
                    .ok_or(ConfigError::Missing("CONVERTER_API_KEY"))?,
                api_host: get("CONVERTER_API_HOST"),
            });
        }

        if settings.backend == Backend::ConverterApi && settings.converter.is_none() {
            return Err(ConfigError::Missing("CONVERTER_API_URL"));
        }

        Ok(settings)
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies(mut self, path: Option<PathBuf>) -> Self {
        self.cookies = path;
        self
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    pub fn with_profiles_path(mut self, path: Option<PathBuf>) -> Self {
        self.profiles_path = path;
        self
    }

    pub fn with_classifier_path(mut self, path: Option<PathBuf>) -> Self {
        self.classifier_path = path;
        self
    }

    pub fn with_converter(mut self, credentials: Option<ConverterCredentials>) -> Self {
        self.converter = credentials;
        self
    }

    /// Configured catalog (built-in when no file is set), cookies attached
    pub fn load_catalog(&self) -> Result<ProfileCatalog, ConfigError> {
        let catalog = match &self.profiles_path {
            Some(path) => ProfileCatalog::load(path)?,
            None => ProfileCatalog::builtin(),
        };

        match &self.cookies {
            Some(source) => {
                let installed = CookieSource::install(source, &self.cache_dir)?;
                Ok(catalog.with_cookies(installed))
            }
            None => Ok(catalog),
        }
    }

    pub fn load_classifier(&self) -> Result<FailureClassifier, ConfigError> {
        match &self.classifier_path {
            Some(path) => FailureClassifier::new(&read_rules(path)?),
            None => Ok(FailureClassifier::default()),
        }
    }
}

fn read_rules(path: &Path) -> Result<ClassifierRules, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}
