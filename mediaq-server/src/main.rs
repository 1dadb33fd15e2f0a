//! Mediaq Server
//!
//! HTTP front end and single-slot download worker for the media queue.
//!
//! Architecture:
//! - API: axum handlers for jobs and files
//! - Services: validation and retry rules
//! - Repository: SQLite persistence of job rows
//! - Execution: the lifecycle manager that drives one run at a time
//! - Scheduler: hands runs to background tasks and restores the queue on start
//! - Downloader: yt-dlp behind a trait

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod downloader;
pub mod execution;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::downloader::{DownloadSettings, YtDlpDownloader};
use crate::execution::JobRunner;
use crate::scheduler::Dispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediaq_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mediaq server...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if let Some(dir) = config.database_dir() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    std::fs::create_dir_all(&config.downloads_dir).with_context(|| {
        format!(
            "Failed to create downloads directory {}",
            config.downloads_dir.display()
        )
    })?;
    // yt-dlp resolves relative output templates against its own working directory
    let downloads_dir = std::fs::canonicalize(&config.downloads_dir)
        .context("Failed to resolve downloads directory")?;

    info!("Downloads go to {}", downloads_dir.display());
    info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let settings = DownloadSettings {
        downloads_dir,
        user_agent: config.user_agent.clone(),
        accept_language: config.accept_language.clone(),
    };
    let downloader = Arc::new(YtDlpDownloader::new(config.ytdlp_path.clone()));
    let runner = Arc::new(JobRunner::new(pool.clone(), downloader, settings));
    let dispatcher = Dispatcher::new(runner);

    let recovered = dispatcher
        .recover()
        .await
        .context("Failed to restore the job queue")?;
    if !recovered.is_empty() {
        info!("Resuming {} queued job(s) from a previous run", recovered.len());
    }

    // Build router with all API endpoints
    let app = api::create_router(api::AppState::new(pool, dispatcher));

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
