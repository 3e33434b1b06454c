use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use reelgrab::cli::{Cli, Commands};
use reelgrab::conversion::check_ffmpeg;
use reelgrab::core::logging::log_startup_configuration;
use reelgrab::core::web_server::{serve, AppState, Services};
use reelgrab::core::{init_logger, Config};
use reelgrab::storage::RequestCounter;

/// Main entry point
///
/// Parses CLI arguments, loads configuration and dispatches to the subcommand.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    let cli = Cli::parse_args();
    let config = Config::load(cli.config.as_deref())?;

    init_logger(&config.log)?;

    match cli.command {
        Some(Commands::Run { port }) => run_server(config, port).await,
        Some(Commands::Stats) => run_stats(&config).await,
        Some(Commands::Sweep) => run_sweep(&config).await,
        None => {
            log::info!("No command specified, running server");
            run_server(config, None).await
        }
    }
}

async fn run_server(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    log_startup_configuration(&config);

    if !check_ffmpeg(&config.transcode.ffmpeg_bin).await {
        log::warn!("ffmpeg not found at '{}'; mp3 requests will fail", config.transcode.ffmpeg_bin);
    }

    let services = Services::from_config(&config).await?;
    let state = AppState::new(&config, &services)?;
    let shutdown = CancellationToken::new();

    let worker = services.cleanup_worker(&config);
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    // Expired rate-limit windows and in-memory store entries
    {
        let rate_limiter = state.rate_limiter.clone();
        let store = services.store.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let windows = rate_limiter.purge_expired().await;
                        let entries = store.purge_expired().await;
                        if windows > 0 || entries > 0 {
                            log::debug!("Purged {} rate-limit window(s), {} store entr(ies)", windows, entries);
                        }
                    }
                }
            }
        });
    }

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            log::info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let result = serve(addr, state, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        log::error!("Cleanup worker panicked: {}", e);
    }
    result
}

async fn run_stats(config: &Config) -> Result<()> {
    let store = reelgrab::storage::connect(config.store.redis_url.as_deref()).await?;
    let total = RequestCounter::new(store).current().await?;
    println!("total_requests: {}", total);
    Ok(())
}

async fn run_sweep(config: &Config) -> Result<()> {
    let services = Services::from_config(config).await?;
    let deleted = services.cleanup_worker(config).run_once().await?;
    log::info!("Sweep finished: {} object(s) deleted", deleted);
    Ok(())
}
