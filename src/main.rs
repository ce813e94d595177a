use anyhow::{bail, Context, Result};
use media_resolver::{handle, logging, Engine, Settings};

const USAGE: &str = "usage: media-resolver [METHOD] <path?query>\n\
                     example: media-resolver '/api/audio?id=dQw4w9WgXcQ'";

/// Run one request against the configured engine
async fn run() -> Result<bool> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (method, target) = match args.as_slice() {
        [target] => ("GET", target.as_str()),
        [method, target] => (method.as_str(), target.as_str()),
        _ => bail!(USAGE),
    };

    let settings = Settings::from_env().context("invalid configuration")?;
    let engine = Engine::from_settings(&settings).context("failed to build engine")?;

    let response = handle(&engine, method, target).await;
    tracing::debug!(status = response.status, "request finished");
    println!("{}", response.body);

    Ok(response.is_success())
}

#[tokio::main]
async fn main() {
    // Initialize logging as early as possible.
    if let Err(err) = logging::init_logging() {
        eprintln!("media-resolver: {:#}", err);
    }

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("media-resolver error: {:#}", err);
            std::process::exit(1);
        }
    }
}
