//! Job Service
//!
//! Business logic for creating, inspecting and retrying download jobs.

use mediaq_core::domain::job::{Job, JobStatus};
use mediaq_core::dto::job::CreateJob;
use mediaq_core::validate::{ValidationError, validate_download_type, validate_url};
use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::execution::RunRequest;
use crate::repository::job_repository;
use crate::scheduler::Dispatcher;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Job {0} not found")]
    NotFound(i64),

    #[error("Job {0} is currently downloading")]
    Conflict(i64),

    #[error("Job {0} is not completed")]
    NotCompleted(i64),

    #[error("File for job {0} not found")]
    FileMissing(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Validate a request, store it as a queued job and schedule its first run
pub async fn create_job(
    pool: &SqlitePool,
    dispatcher: &Dispatcher,
    req: CreateJob,
) -> Result<Job, JobError> {
    let download_type = validate_download_type(&req.download_type)?;
    let url = req.url.trim();
    validate_url(url)?;

    let extra_options = req
        .extra_options
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let job = job_repository::create(pool, url, download_type, extra_options).await?;

    tracing::info!("Job created: {} ({} {})", job.id, job.download_type, job.url);

    dispatcher.dispatch(RunRequest {
        job_id: job.id,
        force_redownload: false,
    });

    Ok(job)
}

/// Get a job by ID
pub async fn get_job(pool: &SqlitePool, id: i64) -> Result<Job, JobError> {
    let job = job_repository::find_by_id(pool, id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    Ok(job)
}

/// List all jobs, newest first
pub async fn list_jobs(pool: &SqlitePool) -> Result<Vec<Job>, JobError> {
    let jobs = job_repository::list_all(pool).await?;
    Ok(jobs)
}

/// Reset a job that is not running and schedule a forced re-download
pub async fn retry_job(
    pool: &SqlitePool,
    dispatcher: &Dispatcher,
    id: i64,
) -> Result<Job, JobError> {
    let job = get_job(pool, id).await?;

    if !job.status.is_retryable() {
        return Err(JobError::Conflict(id));
    }

    // The reset is conditional, so a run that started since the read above still wins
    if !job_repository::reset_for_retry(pool, id).await? {
        return match job_repository::find_by_id(pool, id).await? {
            Some(_) => Err(JobError::Conflict(id)),
            None => Err(JobError::NotFound(id)),
        };
    }

    let job = get_job(pool, id).await?;

    tracing::info!("Job {} reset for retry", id);

    dispatcher.dispatch(RunRequest {
        job_id: id,
        force_redownload: true,
    });

    Ok(job)
}

/// Locate the finished file of a completed job
pub async fn resolve_file(pool: &SqlitePool, id: i64) -> Result<(Job, PathBuf), JobError> {
    let job = get_job(pool, id).await?;

    if job.status != JobStatus::Completed {
        return Err(JobError::NotCompleted(id));
    }

    let path = job
        .file_path
        .as_deref()
        .map(PathBuf::from)
        .ok_or(JobError::FileMissing(id))?;

    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        tracing::warn!("File for job {} is gone: {}", id, path.display());
        return Err(JobError::FileMissing(id));
    }

    Ok((job, path))
}
