// yt-dlp extraction backend
//
// Runs either `python3 -m yt_dlp` (preferred, fewer bot checks in practice) or
// the native `yt-dlp` binary, one subprocess per attempt. Profiles are
// rendered into command-line flags; the output is a single JSON document.

use async_trait::async_trait;
use std::process::Command as StdCommand;
use std::sync::Arc;
use std::time::Duration;

use super::diagnostics::{BlockingReason, FailureClassifier};
use super::traits::{ExtractTarget, ExtractionClient};
use crate::resolver::errors::{ExtractError, FailureKind};
use crate::resolver::models::RawExtraction;
use crate::resolver::profiles::Profile;
use crate::resolver::utils::{run_output_with_timeout, RunError};

/// How yt-dlp is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YtDlpCommand {
    /// Python interpreter with the yt_dlp module
    Python(String),
    /// Native binary
    Binary(String),
}

impl YtDlpCommand {
    /// Pick the invocation: explicit settings first, then python module, then binary
    pub fn detect(python: Option<&str>, binary: Option<&str>) -> Self {
        if let Some(path) = binary {
            return Self::Binary(path.to_string());
        }

        let python_cmd = python.map(str::to_string).unwrap_or_else(find_python);
        if python_has_module(&python_cmd, "yt_dlp") {
            return Self::Python(python_cmd);
        }

        Self::Binary(find_ytdlp())
    }

    fn program(&self) -> &str {
        match self {
            Self::Python(cmd) | Self::Binary(cmd) => cmd,
        }
    }

    fn prefix_args(&self) -> Vec<String> {
        match self {
            Self::Python(_) => vec!["-m".to_string(), "yt_dlp".to_string()],
            Self::Binary(_) => Vec::new(),
        }
    }
}

/// Find Python interpreter
fn find_python() -> String {
    let candidates = ["python3", "/opt/homebrew/bin/python3", "/usr/local/bin/python3"];

    for cmd in candidates {
        if let Ok(output) = StdCommand::new(cmd).arg("--version").output() {
            if output.status.success() {
                return cmd.to_string();
            }
        }
    }

    "python3".to_string()
}

fn python_has_module(python: &str, module: &str) -> bool {
    let code = format!("import {}", module);
    match StdCommand::new(python).args(["-c", &code]).output() {
        Ok(out) => out.status.success(),
        Err(_) => false,
    }
}

/// Find yt-dlp binary
fn find_ytdlp() -> String {
    let common_paths = ["/opt/homebrew/bin/yt-dlp", "/usr/local/bin/yt-dlp", "/usr/bin/yt-dlp"];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = StdCommand::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return path;
            }
        }
    }

    "yt-dlp".to_string()
}

/// yt-dlp subprocess client
pub struct YtDlpClient {
    command: YtDlpCommand,
    classifier: Arc<FailureClassifier>,
    proxy: Option<String>,
    timeout_seconds: u64,
}

impl YtDlpClient {
    pub fn new(command: YtDlpCommand, classifier: Arc<FailureClassifier>) -> Self {
        Self {
            command,
            classifier,
            proxy: None,
            timeout_seconds: 30,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Build command arguments for one attempt
    fn build_args(&self, target: &ExtractTarget, profile: &Profile) -> Vec<String> {
        let mut args = self.command.prefix_args();
        args.extend(
            [
                "--dump-single-json",
                "--skip-download",
                "--no-warnings",
                "--socket-timeout",
            ]
            .map(String::from),
        );
        // Socket timeout stays below the process deadline
        args.push(self.timeout_seconds.saturating_sub(5).max(5).to_string());

        match target {
            ExtractTarget::Direct { quality, .. } => {
                args.push("--no-playlist".to_string());
                args.push("-f".to_string());
                args.push(quality.format_spec().to_string());
            }
            ExtractTarget::Search { .. } => {
                args.push("--flat-playlist".to_string());
            }
        }

        if let Some(extractor_args) = extractor_args(profile) {
            args.push("--extractor-args".to_string());
            args.push(extractor_args);
        }

        for (name, value) in &profile.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                args.push("--user-agent".to_string());
                args.push(value.clone());
            } else {
                args.push("--add-header".to_string());
                args.push(format!("{}:{}", name, value));
            }
        }

        if let Some(path) = profile.cookie_file() {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        if profile.geo_bypass {
            args.push("--geo-bypass".to_string());
        }

        if !profile.check_certificate {
            args.push("--no-check-certificates".to_string());
        }

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        // Keep the target last so a leading dash in it cannot be read as a flag
        args.push("--".to_string());
        args.push(target.expression());
        args
    }

    fn parse_json(stdout: &[u8]) -> Result<RawExtraction, ExtractError> {
        serde_json::from_slice(stdout).map_err(|e| {
            ExtractError::new(
                FailureKind::Transient,
                format!("Invalid JSON from yt-dlp: {}", e),
            )
        })
    }
}

/// `youtube:player_client=a,b;player_skip=c;skip=d`
fn extractor_args(profile: &Profile) -> Option<String> {
    let parts: Vec<String> = [
        ("player_client", &profile.player_clients),
        ("player_skip", &profile.player_skip),
        ("skip", &profile.skip),
    ]
    .iter()
    .filter(|(_, values)| !values.is_empty())
    .map(|(key, values)| format!("{}={}", key, values.join(",")))
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(format!("youtube:{}", parts.join(";")))
    }
}

#[async_trait]
impl ExtractionClient for YtDlpClient {
    fn name(&self) -> &'static str {
        match self.command {
            YtDlpCommand::Python(_) => "python-yt-dlp",
            YtDlpCommand::Binary(_) => "cli-yt-dlp",
        }
    }

    async fn extract(
        &self,
        target: &ExtractTarget,
        profile: &Profile,
    ) -> Result<RawExtraction, ExtractError> {
        let args = self.build_args(target, profile);
        tracing::debug!(
            profile = %profile.name,
            "running {} {}",
            self.command.program(),
            args.join(" ")
        );

        let output = run_output_with_timeout(self.command.program(), &args, self.timeout_seconds)
            .await
            .map_err(|e| match e {
                RunError::Timeout(secs) => ExtractError::timeout(Duration::from_secs(secs)),
                RunError::Spawn { .. } => ExtractError::new(FailureKind::Fatal, e.to_string())
                    .with_reason(BlockingReason::ToolMissing),
                RunError::Io(msg) => ExtractError::new(FailureKind::Transient, msg),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.classifier.to_error(&stderr));
        }

        Self::parse_json(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::models::QualityHint;
    use crate::resolver::profiles::ProfileCatalog;

    fn client() -> YtDlpClient {
        YtDlpClient::new(
            YtDlpCommand::Binary("yt-dlp".to_string()),
            Arc::new(FailureClassifier::default()),
        )
    }

    fn direct(quality: QualityHint) -> ExtractTarget {
        ExtractTarget::Direct {
            url: "https://www.youtube.com/watch?v=abc123".to_string(),
            quality,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_profile_rendered_into_args() {
        let catalog = ProfileCatalog::builtin();
        let args = client().build_args(&direct(QualityHint::Audio), &catalog.direct[1]);

        assert_eq!(
            value_after(&args, "--extractor-args"),
            Some(
                "youtube:player_client=ios,android_creator,android_music,android_embedded;\
                 player_skip=webpage,configs,js;skip=hls,dash,translated_subs"
            )
        );
        assert_eq!(value_after(&args, "-f"), Some("bestaudio/best"));
        assert!(args.contains(&"--geo-bypass".to_string()));
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=abc123")
        );
    }

    #[test]
    fn test_user_agent_and_proxy() {
        let catalog = ProfileCatalog::builtin();
        let client = client().with_proxy(Some("socks5://127.0.0.1:1080".to_string()));
        let args = client.build_args(&direct(QualityHint::Video), &catalog.direct[0]);

        assert!(value_after(&args, "--user-agent").unwrap().contains("iPhone"));
        assert_eq!(value_after(&args, "--proxy"), Some("socks5://127.0.0.1:1080"));
        assert_eq!(value_after(&args, "-f"), Some("bestvideo+bestaudio/best"));
    }

    #[test]
    fn test_search_args() {
        let profile = Profile::new("plain");
        let target = ExtractTarget::Search {
            query: "test song".to_string(),
            limit: 3,
        };
        let args = client().build_args(&target, &profile);

        assert!(args.contains(&"--flat-playlist".to_string()));
        assert!(!args.contains(&"--extractor-args".to_string()));
        assert!(!args.contains(&"-f".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("ytsearch3:test song"));
    }

    #[test]
    fn test_cookies_flag_requires_installed_file() {
        let profile = Profile::new("web").with_cookies(true);
        let args = client().build_args(&direct(QualityHint::Best), &profile);
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_python_prefix() {
        let client = YtDlpClient::new(
            YtDlpCommand::Python("python3".to_string()),
            Arc::new(FailureClassifier::default()),
        );
        let args = client.build_args(&direct(QualityHint::Audio), &Profile::new("p"));
        assert_eq!(&args[..2], &["-m".to_string(), "yt_dlp".to_string()]);
        assert_eq!(client.name(), "python-yt-dlp");
    }

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let client = YtDlpClient::new(
            YtDlpCommand::Binary("definitely-not-yt-dlp-xyz".to_string()),
            Arc::new(FailureClassifier::default()),
        )
        .with_timeout(5);

        let err = client
            .extract(&direct(QualityHint::Audio), &Profile::new("p"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Fatal);
        assert_eq!(err.reason, Some(BlockingReason::ToolMissing));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_is_classified_from_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"ERROR: [youtube] abc123: Sign in to confirm you're not a bot\" >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = YtDlpClient::new(
            YtDlpCommand::Binary(script.to_string_lossy().into_owned()),
            Arc::new(FailureClassifier::default()),
        )
        .with_timeout(10);

        let err = client
            .extract(&direct(QualityHint::Audio), &Profile::new("p"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::BotDetected);
        assert_eq!(err.reason, Some(BlockingReason::BotDetection));
    }

    #[test]
    fn test_invalid_json_is_transient() {
        let err = YtDlpClient::parse_json(b"not json").unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
    }
}
