//! Server configuration
//!
//! Bind address, database location, download directory and the settings
//! handed to yt-dlp. Every value has a default and can be overridden from
//! the environment.

use std::path::{Path, PathBuf};

use crate::downloader::options::DEFAULT_USER_AGENT;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// SQLite connection URL
    pub database_url: String,

    /// Directory finished downloads are written to
    pub downloads_dir: PathBuf,

    /// yt-dlp executable, a path or a name on `PATH`
    pub ytdlp_path: String,

    pub user_agent: String,

    /// Value of the `Accept-Language` header sent to media sites
    pub accept_language: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables (all optional):
    /// - MEDIAQ_BIND_ADDR (default: 0.0.0.0:8080)
    /// - DATABASE_URL (default: sqlite://data/mediaq.db?mode=rwc)
    /// - MEDIAQ_DOWNLOADS_DIR (default: downloads)
    /// - MEDIAQ_YTDLP_PATH (default: yt-dlp)
    /// - MEDIAQ_USER_AGENT (default: a desktop Chrome user agent)
    /// - MEDIAQ_ACCEPT_LANGUAGE (default: ja-JP)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            bind_addr: var("MEDIAQ_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            downloads_dir: var("MEDIAQ_DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            ytdlp_path: var("MEDIAQ_YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            user_agent: var("MEDIAQ_USER_AGENT").unwrap_or(defaults.user_agent),
            accept_language: var("MEDIAQ_ACCEPT_LANGUAGE").unwrap_or(defaults.accept_language),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("bind_addr must be a socket address, got '{}'", self.bind_addr);
        }

        if !self.database_url.starts_with("sqlite:") {
            anyhow::bail!("database_url must start with sqlite:");
        }

        if self.downloads_dir.as_os_str().is_empty() {
            anyhow::bail!("downloads_dir cannot be empty");
        }

        if self.ytdlp_path.is_empty() {
            anyhow::bail!("ytdlp_path cannot be empty");
        }

        if self.accept_language.contains(['\r', '\n']) || self.user_agent.contains(['\r', '\n'])
        {
            anyhow::bail!("header values cannot contain line breaks");
        }

        Ok(())
    }

    /// Directory holding the SQLite database file, if it lives on disk
    pub fn database_dir(&self) -> Option<&Path> {
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let file = rest.split('?').next().unwrap_or_default();

        if file.is_empty() || file == ":memory:" {
            return None;
        }

        Path::new(file)
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://data/mediaq.db?mode=rwc".to_string(),
            downloads_dir: PathBuf::from("downloads"),
            ytdlp_path: "yt-dlp".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "ja-JP".to_string(),
        }
    }
}
