//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::job_service::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    UnprocessableEntity(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(e) => ApiError::UnprocessableEntity(e.to_string()),
            e @ (JobError::NotFound(_) | JobError::FileMissing(_)) => {
                ApiError::NotFound(e.to_string())
            }
            e @ JobError::Conflict(_) => ApiError::Conflict(e.to_string()),
            e @ JobError::NotCompleted(_) => ApiError::BadRequest(e.to_string()),
            JobError::Database(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mediaq_core::validate::ValidationError;

    #[test]
    fn test_job_errors_map_to_status_codes() {
        let cases = [
            (
                JobError::Validation(ValidationError::InvalidInput("bad".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                JobError::Validation(ValidationError::PlaylistUnsupported("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (JobError::NotFound(1), StatusCode::NOT_FOUND),
            (JobError::FileMissing(1), StatusCode::NOT_FOUND),
            (JobError::Conflict(1), StatusCode::CONFLICT),
            (JobError::NotCompleted(1), StatusCode::BAD_REQUEST),
            (
                JobError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
