// Profile catalog - named client-impersonation configurations
//
// Each profile is one way of presenting ourselves to the platform. Chains are
// tried in declared order, so the cheapest and least-blocked profiles go first.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::ConfigError;

const IPHONE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

fn default_true() -> bool {
    true
}

/// One extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,

    /// Player client identities (ios, android_music, web, ...)
    #[serde(default)]
    pub player_clients: Vec<String>,

    /// Player steps to skip (webpage, configs, js)
    #[serde(default)]
    pub player_skip: Vec<String>,

    /// Stream kinds to skip (hls, dash, translated_subs)
    #[serde(default)]
    pub skip: Vec<String>,

    /// Extra request headers, `User-Agent` included
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Send the installed cookie file with this profile
    #[serde(default)]
    pub use_cookies: bool,

    #[serde(default)]
    pub geo_bypass: bool,

    #[serde(default = "default_true")]
    pub check_certificate: bool,

    #[serde(skip)]
    cookies: Option<Arc<CookieSource>>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            player_clients: Vec::new(),
            player_skip: Vec::new(),
            skip: Vec::new(),
            headers: BTreeMap::new(),
            use_cookies: false,
            geo_bypass: false,
            check_certificate: true,
            cookies: None,
        }
    }

    pub fn with_clients(mut self, clients: &[&str]) -> Self {
        self.player_clients = clients.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_player_skip(mut self, steps: &[&str]) -> Self {
        self.player_skip = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_skip(mut self, kinds: &[&str]) -> Self {
        self.skip = kinds.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_user_agent(self, user_agent: &str) -> Self {
        self.with_header("User-Agent", user_agent)
    }

    pub fn with_cookies(mut self, enabled: bool) -> Self {
        self.use_cookies = enabled;
        self
    }

    pub fn with_geo_bypass(mut self, enabled: bool) -> Self {
        self.geo_bypass = enabled;
        self
    }

    pub fn without_certificate_check(mut self) -> Self {
        self.check_certificate = false;
        self
    }

    /// User agent header, if the profile sets one
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v.as_str())
    }

    /// Cookie file to send, only when the profile opted in and one is installed
    pub fn cookie_file(&self) -> Option<&Path> {
        if !self.use_cookies {
            return None;
        }
        self.cookies.as_deref().map(CookieSource::path)
    }

    fn attach_cookies(&mut self, source: &Arc<CookieSource>) {
        if self.use_cookies {
            self.cookies = Some(Arc::clone(source));
        }
    }
}

/// Ordered profile chains for each extraction mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCatalog {
    /// Direct resolution of a single identifier
    pub direct: Vec<Profile>,

    /// Free-text search
    pub search: Vec<Profile>,

    /// Per-result link lookup after a search
    pub entry_links: Vec<Profile>,
}

impl ProfileCatalog {
    /// Catalog equivalent to the hand-tuned handler variants
    pub fn builtin() -> Self {
        Self {
            direct: vec![
                Profile::new("ios-mobile")
                    .with_clients(&["ios"])
                    .with_user_agent(IPHONE_USER_AGENT)
                    .without_certificate_check(),
                Profile::new("mobile-apps")
                    .with_clients(&["ios", "android_creator", "android_music", "android_embedded"])
                    .with_player_skip(&["webpage", "configs", "js"])
                    .with_skip(&["hls", "dash", "translated_subs"])
                    .with_geo_bypass(true)
                    .without_certificate_check(),
                Profile::new("android")
                    .with_clients(&["android", "ios"])
                    .with_geo_bypass(true)
                    .without_certificate_check(),
                Profile::new("web-cookies")
                    .with_clients(&["web", "web_safari"])
                    .with_user_agent(DESKTOP_USER_AGENT)
                    .with_cookies(true),
            ],
            search: vec![Profile::new("default-search")],
            entry_links: vec![Profile::new("android-ios")
                .with_clients(&["android", "ios"])
                .with_geo_bypass(true)
                .without_certificate_check()],
        }
    }

    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every chain must be non-empty with unique names
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, chain) in self.chains() {
            if chain.is_empty() {
                return Err(ConfigError::EmptyChain(label));
            }
            let mut seen = HashSet::new();
            for profile in chain {
                if !seen.insert(profile.name.as_str()) {
                    return Err(ConfigError::DuplicateProfile(profile.name.clone(), label));
                }
            }
        }
        Ok(())
    }

    /// Attach the installed cookie file to every profile that opted in
    pub fn with_cookies(mut self, source: Arc<CookieSource>) -> Self {
        for profile in self
            .direct
            .iter_mut()
            .chain(self.search.iter_mut())
            .chain(self.entry_links.iter_mut())
        {
            profile.attach_cookies(&source);
        }
        self
    }

    fn chains(&self) -> [(&'static str, &Vec<Profile>); 3] {
        [
            ("direct", &self.direct),
            ("search", &self.search),
            ("entry_links", &self.entry_links),
        ]
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Cookie file copied once into a writable location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSource {
    path: PathBuf,
}

impl CookieSource {
    const FILE_NAME: &'static str = "cookies.txt";

    /// Copy `source` into `cache_dir`. Idempotent: an identical copy is reused.
    pub fn install(source: &Path, cache_dir: &Path) -> Result<Arc<Self>, ConfigError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ConfigError::Io { path, source }
        };

        let content = fs::read(source).map_err(io_err(source))?;
        fs::create_dir_all(cache_dir).map_err(io_err(cache_dir))?;

        let target = cache_dir.join(Self::FILE_NAME);
        let up_to_date = fs::read(&target).map_or(false, |existing| existing == content);

        if up_to_date {
            tracing::debug!(path = %target.display(), "cookie file already installed");
        } else {
            fs::write(&target, &content).map_err(io_err(&target))?;
            tracing::info!(path = %target.display(), "installed cookie file");
        }

        Ok(Arc::new(Self { path: target }))
    }

    /// Writable per-user cache directory, temp dir as a fallback
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("media-resolver")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = ProfileCatalog::builtin();
        catalog.validate().unwrap();
        assert_eq!(catalog.direct[0].name, "ios-mobile");
        assert_eq!(catalog.direct[0].user_agent(), Some(IPHONE_USER_AGENT));
        assert!(catalog.direct[1].player_skip.contains(&"webpage".to_string()));
    }

    #[test]
    fn test_empty_chain_rejected() {
        let mut catalog = ProfileCatalog::builtin();
        catalog.search.clear();
        assert!(matches!(
            catalog.validate(),
            Err(ConfigError::EmptyChain("search"))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut catalog = ProfileCatalog::builtin();
        catalog.direct.push(Profile::new("android"));
        assert!(matches!(
            catalog.validate(),
            Err(ConfigError::DuplicateProfile(name, "direct")) if name == "android"
        ));
    }

    #[test]
    fn test_catalog_from_json_defaults() {
        let json = r#"{
            "direct": [{"name": "tv", "player_clients": ["tv_embedded"]}],
            "search": [{"name": "plain"}],
            "entry_links": [{"name": "links", "use_cookies": true}]
        }"#;
        let catalog: ProfileCatalog = serde_json::from_str(json).unwrap();
        catalog.validate().unwrap();
        assert!(catalog.direct[0].check_certificate);
        assert!(!catalog.direct[0].use_cookies);
        assert!(catalog.entry_links[0].use_cookies);
    }

    #[test]
    fn test_cookie_install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("original.txt");
        fs::write(&source, "# Netscape HTTP Cookie File\n").unwrap();
        let cache = dir.path().join("cache");

        let first = CookieSource::install(&source, &cache).unwrap();
        let modified = fs::metadata(first.path()).unwrap().modified().unwrap();
        let second = CookieSource::install(&source, &cache).unwrap();

        assert_eq!(first.path(), second.path());
        assert_eq!(
            fs::metadata(second.path()).unwrap().modified().unwrap(),
            modified
        );
        assert_eq!(
            fs::read_to_string(second.path()).unwrap(),
            "# Netscape HTTP Cookie File\n"
        );
    }

    #[test]
    fn test_cookie_install_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = CookieSource::install(&dir.path().join("absent.txt"), dir.path());
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_cookies_only_attached_to_opted_in_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("c.txt");
        fs::write(&source, "x").unwrap();
        let cookies = CookieSource::install(&source, dir.path()).unwrap();

        let catalog = ProfileCatalog::builtin().with_cookies(cookies.clone());
        assert_eq!(catalog.direct[0].cookie_file(), None);
        assert_eq!(catalog.direct[3].cookie_file(), Some(cookies.path()));
    }
}
