//! Test doubles shared by the server's unit tests

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::downloader::{
    DownloadError, DownloadOptions, DownloadSettings, Downloader, FetchObserver, PostprocessEvent,
    ProbeResult, ProgressEvent, ProgressStatus,
};

pub fn settings(downloads_dir: &Path) -> DownloadSettings {
    DownloadSettings {
        downloads_dir: downloads_dir.to_path_buf(),
        user_agent: "mediaq-test".to_string(),
        accept_language: "ja-JP".to_string(),
    }
}

pub fn progress(
    status: ProgressStatus,
    downloaded: u64,
    total: Option<u64>,
    estimate: Option<u64>,
) -> ProgressEvent {
    ProgressEvent {
        status,
        downloaded_bytes: Some(downloaded),
        total_bytes: total,
        total_bytes_estimate: estimate,
        filename: None,
    }
}

/// What a [`FakeDownloader`] was asked to do
#[derive(Debug, Clone, Default)]
pub struct FakeLog {
    pub probes: usize,
    pub fetches: usize,
    /// Whether the expected file was on disk when each fetch started
    pub existed_at_fetch: Vec<bool>,
    pub options: Vec<DownloadOptions>,
    pub active: usize,
    pub max_active: usize,
    /// Stored progress of the watched job after each progress event
    pub progress_seen: Vec<i64>,
}

/// Scripted downloader that writes `payload` instead of touching the network
pub struct FakeDownloader {
    pub title: Option<String>,
    pub expected_path: PathBuf,
    pub probe_error: Option<String>,
    pub fetch_error: Option<String>,
    pub final_path: Option<PathBuf>,
    pub payload: Vec<u8>,
    /// When set, each fetch waits for a permit before transferring
    pub gate: Option<Arc<Semaphore>>,
    /// Job row read back after every progress event
    pub watch: Option<(SqlitePool, i64)>,
    log: Mutex<FakeLog>,
}

impl FakeDownloader {
    pub fn new(expected_path: impl Into<PathBuf>) -> Self {
        Self {
            title: Some("Sample".to_string()),
            expected_path: expected_path.into(),
            probe_error: None,
            fetch_error: None,
            final_path: None,
            payload: vec![7; 2048],
            gate: None,
            watch: None,
            log: Mutex::new(FakeLog::default()),
        }
    }

    pub fn log(&self) -> FakeLog {
        self.log.lock().unwrap().clone()
    }

    async fn report(
        &self,
        observer: &mut dyn FetchObserver,
        event: ProgressEvent,
    ) -> Result<(), DownloadError> {
        observer.on_progress(event).await?;

        if let Some((pool, job_id)) = &self.watch {
            let stored: i64 = sqlx::query_scalar("SELECT progress FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_one(pool)
                .await
                .unwrap();
            self.log.lock().unwrap().progress_seen.push(stored);
        }
        Ok(())
    }

    async fn transfer(&self, observer: &mut dyn FetchObserver) -> Result<(), DownloadError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if let Some(message) = &self.fetch_error {
            return Err(DownloadError::Network(message.clone()));
        }

        let total = self.payload.len() as u64;
        self.report(
            observer,
            progress(ProgressStatus::Downloading, 0, Some(total), None),
        )
        .await?;
        self.report(
            observer,
            progress(
                ProgressStatus::Downloading,
                total * 45 / 100,
                Some(total),
                None,
            ),
        )
        .await?;

        let target = self.final_path.as_ref().unwrap_or(&self.expected_path);
        tokio::fs::write(target, &self.payload).await?;

        let mut finished = progress(ProgressStatus::Finished, total, Some(total), None);
        finished.filename = Some(target.clone());
        self.report(observer, finished).await?;

        if let Some(path) = &self.final_path {
            observer
                .on_postprocess(PostprocessEvent {
                    output_path: Some(path.clone()),
                })
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn probe(
        &self,
        _url: &str,
        _options: &DownloadOptions,
    ) -> Result<ProbeResult, DownloadError> {
        self.log.lock().unwrap().probes += 1;

        if let Some(message) = &self.probe_error {
            return Err(DownloadError::Network(message.clone()));
        }

        Ok(ProbeResult {
            title: self.title.clone(),
            expected_path: self.expected_path.clone(),
        })
    }

    async fn fetch(
        &self,
        _url: &str,
        options: &DownloadOptions,
        observer: &mut dyn FetchObserver,
    ) -> Result<(), DownloadError> {
        {
            let mut log = self.log.lock().unwrap();
            log.fetches += 1;
            log.existed_at_fetch.push(self.expected_path.exists());
            log.options.push(options.clone());
            log.active += 1;
            log.max_active = log.max_active.max(log.active);
        }

        let result = self.transfer(observer).await;
        self.log.lock().unwrap().active -= 1;
        result
    }
}
