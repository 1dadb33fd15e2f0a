//! Downloader layer
//!
//! The media extraction engine sits behind the [`Downloader`] trait. The
//! lifecycle manager only sees probe results, progress events and a final
//! output path; how the bytes are fetched is up to the implementation.
//!
//! Implementations:
//! - [`YtDlpDownloader`]: drives the `yt-dlp` executable as a child process

pub mod options;
pub mod overlay;
mod ytdlp;

use async_trait::async_trait;
use std::path::PathBuf;

pub use options::{DownloadOptions, DownloadSettings, Postprocessor};
pub use overlay::{OptionOverlay, OverlayError};
pub use ytdlp::YtDlpDownloader;

/// Result of a metadata-only probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Title of the media, when the extractor resolved one
    pub title: Option<String>,
    /// Where the finished file will land with the current options
    pub expected_path: PathBuf,
}

/// Phase reported by a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Downloading,
    /// Raw transfer finished; postprocessing may still follow
    Finished,
}

/// Progress event emitted during a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub filename: Option<PathBuf>,
}

impl ProgressEvent {
    /// Exact total when known, otherwise the estimate; zero counts as unknown
    pub fn total(&self) -> Option<u64> {
        let known = |value: Option<u64>| value.filter(|total| *total > 0);
        known(self.total_bytes).or(known(self.total_bytes_estimate))
    }
}

/// Emitted once postprocessing has produced the final file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostprocessEvent {
    pub output_path: Option<PathBuf>,
}

/// Receiver for events raised from inside a transfer
///
/// An error returned here aborts the transfer and is surfaced by
/// [`Downloader::fetch`] as [`DownloadError::Observer`].
#[async_trait]
pub trait FetchObserver: Send {
    async fn on_progress(&mut self, event: ProgressEvent) -> anyhow::Result<()>;

    async fn on_postprocess(&mut self, event: PostprocessEvent) -> anyhow::Result<()>;
}

/// Failures raised by a downloader
///
/// The display form of every variant is the bare message, because it is what
/// ends up in a job's `error_message`.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("{0}")]
    Extraction(String),

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Postprocess(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Observer(#[from] anyhow::Error),
}

/// External media downloader
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Resolve metadata and the expected output path without fetching media
    async fn probe(&self, url: &str, options: &DownloadOptions)
    -> Result<ProbeResult, DownloadError>;

    /// Fetch the media, reporting progress and postprocessing to `observer`
    async fn fetch(
        &self,
        url: &str,
        options: &DownloadOptions,
        observer: &mut dyn FetchObserver,
    ) -> Result<(), DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(total: Option<u64>, estimate: Option<u64>) -> ProgressEvent {
        ProgressEvent {
            status: ProgressStatus::Downloading,
            downloaded_bytes: Some(10),
            total_bytes: total,
            total_bytes_estimate: estimate,
            filename: None,
        }
    }

    #[test]
    fn test_total_prefers_exact_size() {
        assert_eq!(event(Some(100), Some(90)).total(), Some(100));
        assert_eq!(event(None, Some(90)).total(), Some(90));
        assert_eq!(event(None, None).total(), None);
        assert_eq!(event(Some(0), None).total(), None);
        assert_eq!(event(Some(0), Some(90)).total(), Some(90));
    }

    #[test]
    fn test_error_display_is_bare_message() {
        let err = DownloadError::Network("network unreachable".to_string());
        assert_eq!(err.to_string(), "network unreachable");

        let err = DownloadError::from(anyhow::anyhow!("database is locked"));
        assert_eq!(err.to_string(), "database is locked");
    }
}
