//! Image Cache maintenance tool
//!
//! Runs a clean pass over the disk cache described by the environment and
//! prints a JSON summary. With `--watch`, keeps cleaning at the configured
//! interval until interrupted.

use anyhow::Context;
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_cache::{spawn_clean_task, CacheConfig, CleanReport, ImageCache, PassthroughCodec};

/// Summary printed after the clean pass.
#[derive(Debug, Serialize)]
struct MaintenanceSummary {
    namespace: String,
    root: String,
    entries_before: usize,
    bytes_before: u64,
    clean: CleanReport,
    timestamp: String,
}

/// Entry point of the maintenance tool.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache for the configured namespace
/// 4. Measure usage, run one clean pass, print the summary
/// 5. With `--watch`, start the periodic clean task and wait for SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let watch = std::env::args().skip(1).any(|arg| arg == "--watch");

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: root={}, namespace={}, max_age={}s, max_disk_bytes={}",
        config.cache_root.display(),
        config.namespace,
        config.max_age_secs,
        config.max_disk_bytes
    );
    let clean_interval = config.clean_interval_secs;

    let cache = ImageCache::new(PassthroughCodec, config);

    let entries_before = cache
        .disk_entry_count()
        .await
        .context("failed to count disk entries")?;
    let bytes_before = cache
        .disk_usage_bytes()
        .await
        .context("failed to measure disk usage")?;
    let clean = cache.clean_disk().await.context("clean pass failed")?;

    let summary = MaintenanceSummary {
        namespace: cache.namespace(),
        root: cache.disk_root().display().to_string(),
        entries_before,
        bytes_before,
        clean,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if watch {
        let clean_handle = spawn_clean_task(cache.clone(), clean_interval);
        info!("Periodic clean task started");
        shutdown_signal(clean_handle).await;
    }

    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the clean task.
async fn shutdown_signal(clean_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    clean_handle.abort();
    warn!("Clean task aborted");
}
