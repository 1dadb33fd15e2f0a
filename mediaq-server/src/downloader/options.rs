//! Download option resolution
//!
//! Builds the typed option set for one run: fixed defaults, then the
//! defaults of the job's download type, then the user's overlay on top.
//!
//! Merge policy:
//! - scalar options: last writer wins, user overlay over defaults
//! - headers: overlay headers are appended
//! - postprocessors: one step per kind. Type-default steps stay unless the
//!   overlay removes them (`--no-extract-audio`), overlay fields for an
//!   existing kind update that step in place, new kinds are appended after
//!   the defaults
//! - anything without a typed field goes to an ordered passthrough bag that
//!   is rendered after the fixed options, so the downloader sees the user's
//!   value last

use mediaq_core::domain::job::DownloadType;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::overlay::{OptionOverlay, OptionValue, OverlayError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// File name template inside the downloads directory
pub const OUTPUT_TEMPLATE: &str = "%(title).150B [%(id)s].%(ext)s";

const AUDIO_FORMAT: &str = "bestaudio/best";
const AUDIO_CODEC: &str = "mp3";
const AUDIO_QUALITY: &str = "320K";

/// Overlay keys that would break progress tracking or write outside the
/// downloads directory
const RESERVED_KEYS: &[&str] = &[
    "output",
    "paths",
    "yes_playlist",
    "print",
    "print_to_file",
    "progress_template",
    "newline",
    "quiet",
    "simulate",
    "exec",
    "batch_file",
    "config_locations",
];

/// Process-wide inputs to option resolution
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub downloads_dir: PathBuf,
    pub user_agent: String,
    pub accept_language: String,
}

/// A transformation applied after the raw transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Postprocessor {
    ExtractAudio { codec: String, quality: String },
    RemuxVideo { format: String },
    EmbedMetadata,
    EmbedThumbnail,
}

impl Postprocessor {
    fn same_kind(&self, other: &Postprocessor) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Fully resolved options for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub no_playlist: bool,
    pub no_cache_dir: bool,
    /// Replace files that already exist; only set for forced re-downloads
    pub overwrites: bool,
    /// Absolute output template, scoped to the downloads directory
    pub output_template: PathBuf,
    pub user_agent: String,
    pub headers: Vec<String>,
    pub format: Option<String>,
    pub postprocessors: Vec<Postprocessor>,
    /// Options without a typed field, in first-seen order
    pub passthrough: Vec<(String, OptionValue)>,
}

impl DownloadOptions {
    /// Fixed defaults plus the defaults for `download_type`
    pub fn defaults(
        settings: &DownloadSettings,
        download_type: DownloadType,
        force_redownload: bool,
    ) -> Self {
        let mut options = Self {
            no_playlist: true,
            no_cache_dir: true,
            overwrites: force_redownload,
            output_template: settings.downloads_dir.join(OUTPUT_TEMPLATE),
            user_agent: settings.user_agent.clone(),
            headers: vec![format!("Accept-Language: {}", settings.accept_language)],
            format: None,
            postprocessors: Vec::new(),
            passthrough: Vec::new(),
        };

        if download_type == DownloadType::Audio {
            options.format = Some(AUDIO_FORMAT.to_string());
            options.postprocessors.push(Postprocessor::ExtractAudio {
                codec: AUDIO_CODEC.to_string(),
                quality: AUDIO_QUALITY.to_string(),
            });
        }

        options
    }

    /// Resolve the options for a run, parsing the job's extra options if any
    pub fn resolve(
        settings: &DownloadSettings,
        download_type: DownloadType,
        extra_options: Option<&str>,
        force_redownload: bool,
    ) -> Result<Self, OverlayError> {
        let mut options = Self::defaults(settings, download_type, force_redownload);

        if let Some(extra) = extra_options.filter(|s| !s.trim().is_empty()) {
            let overlay = OptionOverlay::parse(extra)?;
            options.apply_overlay(&overlay);
        }

        Ok(options)
    }

    /// Merge a user overlay over the current options
    pub fn apply_overlay(&mut self, overlay: &OptionOverlay) {
        for (key, value) in overlay.entries() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                warn!("Ignoring reserved extra option --{}", key.replace('_', "-"));
                continue;
            }

            match (key.as_str(), value) {
                ("format", OptionValue::Value(format)) => self.format = Some(format.clone()),
                ("user_agent", OptionValue::Value(agent)) => self.user_agent = agent.clone(),
                ("add_header", OptionValue::Value(header)) => self.headers.push(header.clone()),
                ("force_overwrites", OptionValue::Flag) => self.overwrites = true,
                ("extract_audio", OptionValue::Flag) => {
                    self.add_postprocessor(Postprocessor::ExtractAudio {
                        codec: AUDIO_CODEC.to_string(),
                        quality: AUDIO_QUALITY.to_string(),
                    });
                }
                ("no_extract_audio", OptionValue::Flag) => {
                    self.postprocessors
                        .retain(|pp| !matches!(pp, Postprocessor::ExtractAudio { .. }));
                }
                ("remux_video", OptionValue::Value(format)) => {
                    self.postprocessors
                        .retain(|pp| !matches!(pp, Postprocessor::RemuxVideo { .. }));
                    self.postprocessors.push(Postprocessor::RemuxVideo {
                        format: format.clone(),
                    });
                }
                ("embed_metadata", OptionValue::Flag) => {
                    self.add_postprocessor(Postprocessor::EmbedMetadata)
                }
                ("embed_thumbnail", OptionValue::Flag) => {
                    self.add_postprocessor(Postprocessor::EmbedThumbnail)
                }
                _ => self.set_passthrough(key, value.clone()),
            }
        }

        self.settle_extraction_fields();
    }

    /// Move `--audio-format`/`--audio-quality` from the passthrough bag into
    /// the extraction step once the final set of steps is known, so the last
    /// value written wins wherever it appeared in the overlay
    fn settle_extraction_fields(&mut self) {
        if !self.has_extract_audio() {
            return;
        }

        let mut format = None;
        let mut level = None;
        self.passthrough.retain(|(key, value)| {
            let slot = match key.as_str() {
                "audio_format" => &mut format,
                "audio_quality" => &mut level,
                _ => return true,
            };
            match value {
                OptionValue::Value(v) => *slot = Some(v.clone()),
                OptionValue::Flag => warn!("Ignoring --{} without a value", key.replace('_', "-")),
            }
            false
        });

        for pp in &mut self.postprocessors {
            if let Postprocessor::ExtractAudio { codec, quality } = pp {
                if let Some(format) = &format {
                    *codec = format.clone();
                }
                if let Some(level) = &level {
                    *quality = level.clone();
                }
            }
        }
    }

    fn has_extract_audio(&self) -> bool {
        self.postprocessors
            .iter()
            .any(|pp| matches!(pp, Postprocessor::ExtractAudio { .. }))
    }

    fn add_postprocessor(&mut self, step: Postprocessor) {
        if !self.postprocessors.iter().any(|pp| pp.same_kind(&step)) {
            self.postprocessors.push(step);
        }
    }

    fn set_passthrough(&mut self, key: &str, value: OptionValue) {
        match self.passthrough.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.passthrough.push((key.to_string(), value)),
        }
    }

    /// Extension the postprocessors leave on the final file, if they change it
    pub fn final_extension(&self) -> Option<&str> {
        let extracted = self.postprocessors.iter().find_map(|pp| match pp {
            Postprocessor::ExtractAudio { codec, .. } => audio_codec_extension(codec),
            _ => None,
        });

        extracted.or_else(|| {
            self.postprocessors.iter().find_map(|pp| match pp {
                Postprocessor::RemuxVideo { format }
                    if !format.is_empty() && !format.contains(['>', '/']) =>
                {
                    Some(format.as_str())
                }
                _ => None,
            })
        })
    }

    /// Path of the finished file given the downloader's raw file name
    pub fn expected_final_path(&self, raw: &Path) -> PathBuf {
        match self.final_extension() {
            Some(ext) => raw.with_extension(ext),
            None => raw.to_path_buf(),
        }
    }
}

fn audio_codec_extension(codec: &str) -> Option<&str> {
    match codec {
        "best" | "" => None,
        "aac" | "m4a" | "alac" => Some("m4a"),
        "vorbis" => Some("ogg"),
        other => Some(other),
    }
}
