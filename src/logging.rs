use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging on stderr, leaving stdout for the JSON body.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,media_resolver=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    Ok(())
}
