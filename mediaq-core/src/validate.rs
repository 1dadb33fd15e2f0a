//! Request validation
//!
//! Pure checks applied to a create request before any row exists.

use url::Url;

use crate::domain::job::DownloadType;

/// Reasons a create request is refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Malformed or missing input
    #[error("{0}")]
    InvalidInput(String),

    /// The URL points at a playlist, which is deliberately not handled
    #[error("playlist URLs are not supported: {0}")]
    PlaylistUnsupported(String),
}

/// Parse a submitted download type
pub fn validate_download_type(value: &str) -> Result<DownloadType, ValidationError> {
    value.parse().map_err(|_| {
        ValidationError::InvalidInput(format!(
            "download_type must be 'video' or 'audio', got '{}'",
            value
        ))
    })
}

/// Check that `value` is an absolute http(s) URL with a host and is not a playlist
pub fn validate_url(value: &str) -> Result<Url, ValidationError> {
    let invalid = || {
        ValidationError::InvalidInput(
            "url must be a valid absolute URL starting with http:// or https://".to_string(),
        )
    };

    if value.trim().is_empty() {
        return Err(ValidationError::InvalidInput("url is required".to_string()));
    }

    let url = Url::parse(value).map_err(|_| invalid())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }

    if !url.host_str().is_some_and(|host| !host.is_empty()) {
        return Err(invalid());
    }

    if is_playlist_url(&url) {
        return Err(ValidationError::PlaylistUnsupported(value.to_string()));
    }

    Ok(url)
}

/// A URL is playlist-shaped when it carries a non-empty `list` query
/// parameter or its path mentions `playlist`
pub fn is_playlist_url(url: &Url) -> bool {
    let has_list_param = url
        .query_pairs()
        .any(|(key, value)| key == "list" && !value.is_empty());

    has_list_param || url.path().contains("playlist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_type_accepts_known_values() {
        assert_eq!(validate_download_type("video"), Ok(DownloadType::Video));
        assert_eq!(validate_download_type("audio"), Ok(DownloadType::Audio));
    }

    #[test]
    fn test_download_type_rejects_other_values() {
        for value in ["", "Video", "mp3", "both"] {
            assert!(matches!(
                validate_download_type(value),
                Err(ValidationError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/v=abc").is_ok());
        assert!(validate_url("http://www.youtube.com/watch?v=dQw4w9WgXcQ").is_ok());
        // An empty list parameter is not a playlist
        assert!(validate_url("https://example.com/watch?v=abc&list=").is_ok());
    }

    #[test]
    fn test_malformed_urls() {
        for value in [
            "",
            "   ",
            "example.com/video",
            "ftp://example.com/file",
            "file:///etc/passwd",
            "javascript:alert(1)",
            "https://",
        ] {
            assert!(
                matches!(validate_url(value), Err(ValidationError::InvalidInput(_))),
                "expected InvalidInput for {:?}",
                value
            );
        }
    }

    #[test]
    fn test_playlist_urls_are_rejected() {
        for value in [
            "https://example.com/playlist?list=XYZ",
            "https://www.youtube.com/watch?v=abc&list=PL123",
            "https://example.com/channel/playlists",
            "https://example.com/a/playlist/b",
        ] {
            assert!(
                matches!(
                    validate_url(value),
                    Err(ValidationError::PlaylistUnsupported(_))
                ),
                "expected PlaylistUnsupported for {}",
                value
            );
        }
    }
}
