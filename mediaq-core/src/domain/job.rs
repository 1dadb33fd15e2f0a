//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound, in characters, for a persisted error message
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Download job record
///
/// One row per download request. `url`, `download_type` and `extra_options`
/// never change after creation; everything else is driven by the lifecycle
/// manager or reset by a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub url: String,
    pub download_type: DownloadType,
    pub status: JobStatus,
    pub title: Option<String>,
    pub file_size: i64,
    pub progress: i64,
    pub file_path: Option<String>,
    pub error_message: Option<String>,
    pub extra_options: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Error,
    Canceled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Downloading,
        JobStatus::Completed,
        JobStatus::Error,
        JobStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Whether a retry may reset a job in this status
    pub fn is_retryable(self) -> bool {
        self != JobStatus::Downloading
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "job status",
                value: s.to_string(),
            })
    }
}

/// What the downloader should produce for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    Video,
    Audio,
}

impl DownloadType {
    pub fn as_str(self) -> &'static str {
        match self {
            DownloadType::Video => "video",
            DownloadType::Audio => "audio",
        }
    }
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(DownloadType::Video),
            "audio" => Ok(DownloadType::Audio),
            _ => Err(UnknownVariant {
                kind: "download type",
                value: s.to_string(),
            }),
        }
    }
}

/// A stored or submitted enum value that matches no variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Cut an error message down to [`MAX_ERROR_MESSAGE_CHARS`] characters
pub fn truncate_error_message(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_CHARS) {
        Some((end, _)) => message[..end].to_string(),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_downloading_blocks_retry() {
        assert!(!JobStatus::Downloading.is_retryable());
        assert!(JobStatus::Queued.is_retryable());
        assert!(JobStatus::Completed.is_retryable());
        assert!(JobStatus::Error.is_retryable());
        assert!(JobStatus::Canceled.is_retryable());
    }

    #[test]
    fn test_enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(
            serde_json::to_string(&DownloadType::Audio).unwrap(),
            "\"audio\""
        );
    }

    #[test]
    fn test_download_type_rejects_unknown() {
        let err = "podcast".parse::<DownloadType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown download type: 'podcast'");
    }

    #[test]
    fn test_truncate_error_message() {
        assert_eq!(truncate_error_message("network unreachable"), "network unreachable");

        let long = "x".repeat(MAX_ERROR_MESSAGE_CHARS + 20);
        assert_eq!(
            truncate_error_message(&long).chars().count(),
            MAX_ERROR_MESSAGE_CHARS
        );

        // Multi-byte characters are counted as characters, not bytes
        let wide = "あ".repeat(MAX_ERROR_MESSAGE_CHARS + 1);
        let cut = truncate_error_message(&wide);
        assert_eq!(cut.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    }
}
