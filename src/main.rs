//! Application entry point: live pitch correction until Ctrl-C.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from the path given as the only argument, or from
//!    the platform `settings.toml` (defaults on first run).
//! 3. Build the [`Pipeline`] with the cpal backend and the default engine,
//!    and configure it.  Configuration errors end the program here, before
//!    any audio device is opened.
//! 4. Start the pipeline.
//! 5. On a small [`tokio`] runtime, log stats periodically until Ctrl-C.
//! 6. Stop the pipeline and print the final stats as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use live_autotune::{
    audio::CpalBackend,
    config::AppConfig,
    pipeline::Pipeline,
    tuning::AutotuneEngine,
};

// ---------------------------------------------------------------------------
// Stats loop
// ---------------------------------------------------------------------------

/// Log a stats line every `interval` until Ctrl-C.  A zero interval only
/// waits for Ctrl-C.
async fn run_until_interrupted(pipeline: &Pipeline, interval: Duration) -> Result<()> {
    if interval.is_zero() {
        tokio::signal::ctrl_c().await?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                log::info!("Ctrl-C received");
                return Ok(());
            }
            _ = ticker.tick() => {
                log::info!("stats: {}", pipeline.stats());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("live-autotune starting up");

    // 2. Configuration
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load_from(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };

    // 3. Pipeline
    let pipeline = Pipeline::new(
        Arc::new(CpalBackend::new()),
        Arc::new(AutotuneEngine::default()),
    );
    pipeline
        .configure(config.pipeline_config())
        .context("invalid configuration")?;

    // 4. Audio
    pipeline.start().context("failed to start pipeline")?;
    log::info!("Running; press Ctrl-C to stop");

    // 5. Wait
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    let interval = Duration::from_secs(config.pipeline.stats_interval_secs);
    let waited = rt.block_on(run_until_interrupted(&pipeline, interval));

    // 6. Shutdown
    pipeline.stop();
    let summary = serde_json::to_string_pretty(&pipeline.stats())?;
    println!("{summary}");

    waited
}
