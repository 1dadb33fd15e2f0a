//! Job Repository
//!
//! Handles all database operations related to download jobs.
//! Each mutation is one atomic single-row statement and refreshes `updated_at`.

use mediaq_core::domain::job::{DownloadType, Job, JobStatus};
use sqlx::SqlitePool;

const SELECT_COLUMNS: &str = r#"
    SELECT id, url, download_type, status, title, file_size, progress,
           file_path, error_message, extra_options, created_at, updated_at
    FROM jobs
"#;

/// Insert a new job in `queued` state and return the stored row
pub async fn create(
    pool: &SqlitePool,
    url: &str,
    download_type: DownloadType,
    extra_options: Option<&str>,
) -> Result<Job, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (url, download_type, status, extra_options, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(url)
    .bind(download_type.as_str())
    .bind(JobStatus::Queued.as_str())
    .bind(extra_options)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_id(pool, result.last_insert_rowid())
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Find a job by ID
pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(Job::try_from).transpose()
}

/// List all jobs, newest first
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&format!("{SELECT_COLUMNS} ORDER BY id DESC"))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Find jobs by status, oldest first
pub async fn find_by_status(pool: &SqlitePool, status: JobStatus) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "{SELECT_COLUMNS} WHERE status = $1 ORDER BY id ASC"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Enter `downloading` at the start of a run
pub async fn mark_downloading(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1, progress = 0, error_message = NULL, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(JobStatus::Downloading.as_str())
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record the title resolved by the metadata probe
pub async fn update_title(pool: &SqlitePool, id: i64, title: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET title = $1, updated_at = $2 WHERE id = $3")
        .bind(title)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record transfer progress
pub async fn update_progress(
    pool: &SqlitePool,
    id: i64,
    progress: i64,
    file_size: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET progress = $1, file_size = $2, updated_at = $3 WHERE id = $4")
        .bind(progress)
        .bind(file_size)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Terminal success: file location, size and full progress
pub async fn mark_completed(
    pool: &SqlitePool,
    id: i64,
    file_path: &str,
    file_size: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1, file_path = $2, file_size = $3, progress = 100, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(JobStatus::Completed.as_str())
    .bind(file_path)
    .bind(file_size)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Terminal failure with an already bounded message
pub async fn mark_error(pool: &SqlitePool, id: i64, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = $1, error_message = $2, updated_at = $3 WHERE id = $4")
        .bind(JobStatus::Error.as_str())
        .bind(message)
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Put a job back in the queue with every run-derived field cleared
///
/// The update only applies while the job is not downloading. Returns whether
/// a row was reset.
pub async fn reset_for_retry(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1, progress = 0, file_size = 0, file_path = NULL,
            error_message = NULL, title = NULL, updated_at = $2
        WHERE id = $3 AND status <> $4
        "#,
    )
    .bind(JobStatus::Queued.as_str())
    .bind(chrono::Utc::now())
    .bind(id)
    .bind(JobStatus::Downloading.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Move every job stuck in `downloading` to `error`
///
/// Only meaningful at startup, before any run can hold the execution slot.
pub async fn fail_interrupted(pool: &SqlitePool, message: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET status = $1, error_message = $2, updated_at = $3 WHERE status = $4",
    )
    .bind(JobStatus::Error.as_str())
    .bind(message)
    .bind(chrono::Utc::now())
    .bind(JobStatus::Downloading.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    url: String,
    download_type: String,
    status: String,
    title: Option<String>,
    file_size: i64,
    progress: i64,
    file_path: Option<String>,
    error_message: Option<String>,
    extra_options: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let download_type = row
            .download_type
            .parse::<DownloadType>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Job {
            id: row.id,
            url: row.url,
            download_type,
            status,
            title: row.title,
            file_size: row.file_size,
            progress: row.progress,
            file_path: row.file_path,
            error_message: row.error_message,
            extra_options: row.extra_options,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
