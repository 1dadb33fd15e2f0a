//! Job execution
//!
//! [`JobRunner`] drives a job through one run: it waits for the execution
//! slot, resolves options, probes, short-circuits on an existing file or
//! fetches, and records every transition in the store. Failures never escape
//! a run; they end up in the job's `error_message`.

use async_trait::async_trait;
use mediaq_core::domain::job::{Job, JobStatus, truncate_error_message};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::downloader::{
    DownloadError, DownloadOptions, DownloadSettings, Downloader, FetchObserver, OverlayError,
    PostprocessEvent, ProgressEvent, ProgressStatus,
};
use crate::repository::job_repository;

/// Parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    pub job_id: i64,
    /// Replace a file left by an earlier run instead of reusing it
    pub force_redownload: bool,
}

/// Failure inside a run body
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Options(#[from] OverlayError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Downloaded(PathBuf),
    /// The expected file was already on disk; nothing was fetched
    AlreadyPresent(PathBuf),
}

/// Lifecycle manager for download jobs
pub struct JobRunner {
    pool: SqlitePool,
    downloader: Arc<dyn Downloader>,
    settings: DownloadSettings,
    slot: Semaphore,
}

impl JobRunner {
    /// Creates a runner with a single execution slot
    pub fn new(
        pool: SqlitePool,
        downloader: Arc<dyn Downloader>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            pool,
            downloader,
            settings,
            slot: Semaphore::new(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute one run of a job
    ///
    /// Waits for the execution slot, then runs to completion or failure.
    /// Runs are not cancellable once they hold the slot.
    pub async fn run(&self, request: RunRequest) {
        let job_id = request.job_id;

        let _permit = match self.slot.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Execution slot closed, dropping run for job {}: {}", job_id, e);
                return;
            }
        };

        let job = match job_repository::find_by_id(&self.pool, job_id).await {
            Ok(Some(job)) if job.status == JobStatus::Canceled => {
                info!("Job {} was canceled while waiting, skipping run", job_id);
                return;
            }
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Job {} no longer exists, skipping run", job_id);
                return;
            }
            Err(e) => {
                error!("Failed to load job {}: {}", job_id, e);
                self.record_failure(job_id, &RunError::from(e)).await;
                return;
            }
        };

        if let Err(e) = job_repository::mark_downloading(&self.pool, job_id).await {
            error!("Failed to start job {}: {}", job_id, e);
            self.record_failure(job_id, &RunError::from(e)).await;
            return;
        }

        info!(
            "Running job {} ({} {}, force: {})",
            job_id, job.download_type, job.url, request.force_redownload
        );

        match self.execute(&job, request.force_redownload).await {
            Ok(RunOutcome::Downloaded(path)) => {
                info!("Job {} completed: {}", job_id, path.display());
            }
            Ok(RunOutcome::AlreadyPresent(path)) => {
                info!("Job {} completed from existing file: {}", job_id, path.display());
            }
            Err(e) => self.record_failure(job_id, &e).await,
        }
    }

    /// Best-effort move to `error`; a store that is down stays logged only
    async fn record_failure(&self, job_id: i64, err: &RunError) {
        let message = truncate_error_message(&err.to_string());
        warn!("Job {} failed: {}", job_id, message);

        if let Err(db_err) = job_repository::mark_error(&self.pool, job_id, &message).await {
            error!("Failed to record error for job {}: {}", job_id, db_err);
        }
    }

    async fn execute(&self, job: &Job, force_redownload: bool) -> Result<RunOutcome, RunError> {
        let options = DownloadOptions::resolve(
            &self.settings,
            job.download_type,
            job.extra_options.as_deref(),
            force_redownload,
        )?;

        let probe = self.downloader.probe(&job.url, &options).await?;
        if let Some(title) = &probe.title {
            job_repository::update_title(&self.pool, job.id, title).await?;
        }

        let expected = probe.expected_path;
        debug!("Job {} expects output at {}", job.id, expected.display());

        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            if !force_redownload {
                let size = file_size(&expected).await;
                job_repository::mark_completed(
                    &self.pool,
                    job.id,
                    &expected.to_string_lossy(),
                    size,
                )
                .await?;
                return Ok(RunOutcome::AlreadyPresent(expected));
            }

            match tokio::fs::remove_file(&expected).await {
                Ok(()) => debug!("Removed previous file {}", expected.display()),
                Err(e) => warn!(
                    "Could not remove previous file {} for job {}: {}",
                    expected.display(),
                    job.id,
                    e
                ),
            }
        }

        let mut tracker = ProgressTracker::new(self.pool.clone(), job.id);
        self.downloader
            .fetch(&job.url, &options, &mut tracker)
            .await?;

        let final_path = tracker.final_path.unwrap_or(expected);
        let size = file_size(&final_path).await;
        job_repository::mark_completed(&self.pool, job.id, &final_path.to_string_lossy(), size)
            .await?;

        Ok(RunOutcome::Downloaded(final_path))
    }
}

// =============================================================================
// Progress Tracking
// =============================================================================

/// Persists downloader events for the job that holds the slot
struct ProgressTracker {
    pool: SqlitePool,
    job_id: i64,
    progress: i64,
    /// Most recent file the downloader reported writing to
    last_filename: Option<PathBuf>,
    final_path: Option<PathBuf>,
}

impl ProgressTracker {
    fn new(pool: SqlitePool, job_id: i64) -> Self {
        Self {
            pool,
            job_id,
            progress: 0,
            last_filename: None,
            final_path: None,
        }
    }
}

#[async_trait]
impl FetchObserver for ProgressTracker {
    async fn on_progress(&mut self, event: ProgressEvent) -> anyhow::Result<()> {
        if let Some(filename) = &event.filename {
            self.last_filename = Some(filename.clone());
        }

        match event.status {
            ProgressStatus::Downloading => {
                let Some(total) = event.total() else {
                    return Ok(());
                };
                let downloaded = event.downloaded_bytes.unwrap_or(0);

                // Never move backwards within a run, e.g. when a merge fetches a second stream
                self.progress = percent(downloaded, total).max(self.progress);
                job_repository::update_progress(&self.pool, self.job_id, self.progress, to_i64(total))
                    .await?;
            }
            ProgressStatus::Finished => {
                let size = match &self.last_filename {
                    Some(path) => file_size(path).await,
                    None => event.downloaded_bytes.or(event.total()).map(to_i64).unwrap_or(0),
                };

                self.progress = 100;
                job_repository::update_progress(&self.pool, self.job_id, 100, size).await?;
            }
        }

        Ok(())
    }

    async fn on_postprocess(&mut self, event: PostprocessEvent) -> anyhow::Result<()> {
        if let Some(path) = event.output_path {
            debug!("Job {} postprocessed into {}", self.job_id, path.display());
            self.final_path = Some(path);
        }
        Ok(())
    }
}

/// floor(100 * downloaded / total), clamped to 0..=100
fn percent(downloaded: u64, total: u64) -> i64 {
    if total == 0 {
        return 0;
    }
    let value = (u128::from(downloaded) * 100) / u128::from(total);
    value.min(100) as i64
}

fn to_i64(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

/// Size of a file on disk, 0 when it cannot be read
async fn file_size(path: &Path) -> i64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| to_i64(meta.len()))
        .unwrap_or(0)
}
