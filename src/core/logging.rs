//! Logging initialization
//!
//! Three sinks:
//! - terminal at Info
//! - combined log file at Info
//! - error log file at Error only

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::path::Path;

use crate::core::config::{Config, LogConfig};

/// Initialize logger for console, combined file and error file output
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - A log file could not be created, or a logger
///   was already installed
pub fn init_logger(config: &LogConfig) -> Result<()> {
    let combined = create_log_file(&config.file_path)?;
    let errors = create_log_file(&config.error_file_path)?;

    let log_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            log_config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, log_config.clone(), combined),
        WriteLogger::new(LevelFilter::Error, log_config, errors),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

fn create_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("Failed to create log file {}: {}", path.display(), e))
}

/// Logs the effective configuration at startup. Secrets are never printed.
pub fn log_startup_configuration(config: &Config) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("reelgrab {} starting", env!("CARGO_PKG_VERSION"));
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Listen: {}:{}", config.server.host, config.server.port);

    match config.store.redis_url {
        Some(_) => log::info!("Store: redis"),
        None => log::warn!("Store: in-memory (request count and pending cleanups are lost on restart)"),
    }

    log::info!("Allowed origins: {:?}", config.cors.allowed_origins);
    log::info!(
        "Rate limit: {} requests / {}s per IP",
        config.rate_limit.max_requests,
        config.rate_limit.window_secs
    );
    log::info!(
        "Cache TTL: mp4 {}s, mp3 {}s; remote cleanup after {}s",
        config.cache.video_ttl_secs,
        config.cache.audio_ttl_secs,
        config.cleanup.delay_secs
    );
    log::info!("Temp dir: {}", config.download.temp_dir.display());

    if config.cloudinary.is_configured() {
        log::info!(
            "Object store: cloudinary ({}, {} signatures)",
            config.cloudinary.cloud_name,
            config.cloudinary.signature_algorithm.as_str()
        );
    } else {
        log::error!("Object store: cloudinary credentials missing - mp3 requests will fail");
    }
}
