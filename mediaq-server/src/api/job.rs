//! Job API Handlers
//!
//! HTTP endpoints for creating, listing, retrying and downloading jobs.

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use mediaq_core::domain::job::Job;
use mediaq_core::dto::job::CreateJob;
use tokio_util::io::ReaderStream;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::job_service;

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /jobs
/// Register a new download job and schedule its first run
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    tracing::info!("Creating {} job for {}", req.download_type, req.url);

    let job = job_service::create_job(&state.pool, &state.dispatcher, req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs
/// List all jobs, newest first
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing all jobs");

    let jobs = job_service::list_jobs(&state.pool).await?;
    Ok(Json(jobs))
}

/// GET /jobs/{id}
/// Get job details by ID
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(&state.pool, id).await?;
    Ok(Json(job))
}

/// POST /jobs/{id}/retry
/// Reset a job and schedule a forced re-download
pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Retrying job: {}", id);

    let job = job_service::retry_job(&state.pool, &state.dispatcher, id).await?;
    Ok(Json(job))
}

// =============================================================================
// File Download
// =============================================================================

/// GET /jobs/{id}/file
/// Stream the finished file of a completed job
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let (_, path) = job_service::resolve_file(&state.pool, id).await?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ApiError::NotFound(format!("File for job {} not found", id)),
        _ => ApiError::InternalError(format!("Failed to open file for job {}: {}", id, e)),
    })?;
    let file_size = file.metadata().await.map(|meta| meta.len()).ok();

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("job-{}", id));

    tracing::info!("Streaming file for job {}: {}", id, path.display());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename));
    if let Some(size) = file_size {
        response = response.header(header::CONTENT_LENGTH, size.to_string());
    }

    response
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::InternalError(format!("Failed to build response: {}", e)))
}

/// `attachment` header with an ASCII fallback and an RFC 5987 UTF-8 name
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_encodes_utf8_names() {
        assert_eq!(
            content_disposition("Sample [abc].mp3"),
            "attachment; filename=\"Sample [abc].mp3\"; filename*=UTF-8''Sample%20%5Babc%5D.mp3"
        );
        assert_eq!(
            content_disposition("曲 \"1\".mp3"),
            "attachment; filename=\"_ _1_.mp3\"; filename*=UTF-8''%E6%9B%B2%20%221%22.mp3"
        );
    }
}
