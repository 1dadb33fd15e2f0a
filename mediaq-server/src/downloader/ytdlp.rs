//! yt-dlp downloader
//!
//! Runs the `yt-dlp` executable as a child process. Probe and fetch both ask
//! yt-dlp to print tagged lines on stdout (`--print`, `--progress-template`),
//! which are parsed back into probe results and observer events. A failed
//! process is classified from the last `ERROR:` line on stderr.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::options::{DownloadOptions, Postprocessor};
use super::overlay::OptionValue;
use super::{
    DownloadError, Downloader, FetchObserver, PostprocessEvent, ProbeResult, ProgressEvent,
    ProgressStatus,
};

const TITLE_TAG: &str = "[mediaq:title]";
const FILE_TAG: &str = "[mediaq:file]";
const PROGRESS_TAG: &str = "[mediaq:progress]";
const FINAL_TAG: &str = "[mediaq:final]";

/// yt-dlp renders missing template fields as this placeholder
const MISSING: &str = "NA";

/// Downloader backed by the `yt-dlp` command line tool
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
}

impl YtDlpDownloader {
    /// Creates a downloader that runs `program` (a path or a name on `PATH`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, err: std::io::Error) -> DownloadError {
        DownloadError::Io(std::io::Error::new(
            err.kind(),
            format!("failed to start {}: {}", self.program, err),
        ))
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn probe(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<ProbeResult, DownloadError> {
        let args = probe_args(url, options);
        debug!("Probing {} with {} {:?}", url, self.program, args);

        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr, output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (title, raw_path) = parse_probe_output(&stdout);
        let raw_path = raw_path.ok_or_else(|| {
            DownloadError::Extraction("yt-dlp did not report an output filename".to_string())
        })?;

        Ok(ProbeResult {
            title,
            expected_path: options.expected_final_path(&raw_path),
        })
    }

    async fn fetch(
        &self,
        url: &str,
        options: &DownloadOptions,
        observer: &mut dyn FetchObserver,
    ) -> Result<(), DownloadError> {
        let args = fetch_args(url, options);
        debug!("Fetching {} with {} {:?}", url, self.program, args);

        let mut child = self.command(&args).spawn().map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Io(std::io::Error::other("stdout was not captured")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Io(std::io::Error::other("stderr was not captured")))?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut lines = BufReader::new(stdout).split(b'\n');
        while let Some(raw) = lines.next_segment().await? {
            let line = String::from_utf8_lossy(&raw);
            let delivered = match parse_fetch_line(&line) {
                Some(FetchLine::Progress(event)) => observer.on_progress(event).await,
                Some(FetchLine::FinalPath(path)) => {
                    observer
                        .on_postprocess(PostprocessEvent {
                            output_path: Some(path),
                        })
                        .await
                }
                None => {
                    trace!("yt-dlp: {}", line.trim_end());
                    Ok(())
                }
            };

            if let Err(e) = delivered {
                warn!("Aborting yt-dlp after observer failure: {:#}", e);
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(DownloadError::Observer(e));
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(classify_failure(&stderr, status));
        }

        Ok(())
    }
}

// =============================================================================
// Command Lines
// =============================================================================

fn common_args(options: &DownloadOptions) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if options.no_playlist {
        args.push("--no-playlist".into());
    }
    if options.no_cache_dir {
        args.push("--no-cache-dir".into());
    }
    if options.overwrites {
        args.push("--force-overwrites".into());
    }
    args.extend([
        "--no-mtime".to_string(),
        "--no-warnings".to_string(),
        "--output".to_string(),
        options.output_template.to_string_lossy().into_owned(),
        "--user-agent".to_string(),
        options.user_agent.clone(),
    ]);
    for header in &options.headers {
        args.push("--add-header".into());
        args.push(header.clone());
    }
    if let Some(format) = &options.format {
        args.push("--format".into());
        args.push(format.clone());
    }

    for step in &options.postprocessors {
        match step {
            Postprocessor::ExtractAudio { codec, quality } => args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                codec.clone(),
                "--audio-quality".to_string(),
                quality.clone(),
            ]),
            Postprocessor::RemuxVideo { format } => {
                args.extend(["--remux-video".to_string(), format.clone()])
            }
            Postprocessor::EmbedMetadata => args.push("--embed-metadata".into()),
            Postprocessor::EmbedThumbnail => args.push("--embed-thumbnail".into()),
        }
    }

    for (key, value) in &options.passthrough {
        args.push(format!("--{}", key.replace('_', "-")));
        if let OptionValue::Value(value) = value {
            args.push(value.clone());
        }
    }

    args
}

fn probe_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    let mut args = common_args(options);
    args.extend([
        "--simulate".to_string(),
        "--print".to_string(),
        format!("{TITLE_TAG} %(title)s"),
        "--print".to_string(),
        format!("{FILE_TAG} %(filename)s"),
        "--".to_string(),
        url.to_string(),
    ]);
    args
}

fn fetch_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    let mut args = common_args(options);
    args.extend([
        "--no-simulate".to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        format!(
            "download:{PROGRESS_TAG} %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.filename)s"
        ),
        "--print".to_string(),
        format!("after_move:{FINAL_TAG} %(filepath)s"),
        "--".to_string(),
        url.to_string(),
    ]);
    args
}

// =============================================================================
// Output Parsing
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum FetchLine {
    Progress(ProgressEvent),
    FinalPath(PathBuf),
}

fn tagged<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix(tag)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

fn present(field: &str) -> Option<&str> {
    let field = field.trim();
    (!field.is_empty() && field != MISSING).then_some(field)
}

/// yt-dlp prints byte counts as integers and estimates as floats
fn parse_bytes(field: &str) -> Option<u64> {
    present(field)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
}

fn parse_probe_output(stdout: &str) -> (Option<String>, Option<PathBuf>) {
    let mut title = None;
    let mut path = None;

    for line in stdout.lines() {
        if let Some(rest) = tagged(line, TITLE_TAG) {
            title = present(rest).map(str::to_string);
        } else if let Some(rest) = tagged(line, FILE_TAG) {
            path = present(rest).map(PathBuf::from);
        }
    }

    (title, path)
}

fn parse_fetch_line(line: &str) -> Option<FetchLine> {
    if let Some(rest) = tagged(line, FINAL_TAG) {
        return present(rest).map(|p| FetchLine::FinalPath(PathBuf::from(p)));
    }

    let rest = tagged(line, PROGRESS_TAG)?;
    let mut fields = rest.splitn(5, '|');
    let status = match fields.next()?.trim() {
        "downloading" => ProgressStatus::Downloading,
        "finished" => ProgressStatus::Finished,
        _ => return None,
    };
    let downloaded_bytes = fields.next().and_then(parse_bytes);
    let total_bytes = fields.next().and_then(parse_bytes);
    let total_bytes_estimate = fields.next().and_then(parse_bytes);
    let filename = fields.next().and_then(present).map(PathBuf::from);

    Some(FetchLine::Progress(ProgressEvent {
        status,
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
        filename,
    }))
}

/// Map a failed yt-dlp run to an error class using its stderr
fn classify_failure(stderr: &str, status: ExitStatus) -> DownloadError {
    let message = stderr
        .lines()
        .rev()
        .find_map(|line| line.split_once("ERROR:").map(|(_, msg)| msg.trim()))
        .filter(|msg| !msg.is_empty())
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("yt-dlp exited with {}", status));

    let lower = message.to_lowercase();
    if lower.contains("postprocessing") || lower.contains("ffmpeg") || lower.contains("ffprobe") {
        DownloadError::Postprocess(message)
    } else if [
        "unable to download",
        "urlopen error",
        "timed out",
        "connection",
        "network",
        "getaddrinfo",
        "name or service not known",
        "http error",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
    {
        DownloadError::Network(message)
    } else {
        DownloadError::Extraction(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::options::DownloadSettings;
    use mediaq_core::domain::job::DownloadType;

    fn options(download_type: DownloadType, extra: Option<&str>, force: bool) -> DownloadOptions {
        let settings = DownloadSettings {
            downloads_dir: PathBuf::from("/srv/media"),
            user_agent: "agent/1.0".to_string(),
            accept_language: "ja-JP".to_string(),
        };
        DownloadOptions::resolve(&settings, download_type, extra, force).unwrap()
    }

    fn failed_status() -> ExitStatus {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ExitStatus::from_raw(1 << 8)
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::ExitStatusExt;
            ExitStatus::from_raw(1)
        }
    }

    #[test]
    fn test_common_args_for_audio() {
        let args = common_args(&options(DownloadType::Audio, None, false));

        assert_eq!(
            args,
            vec![
                "--no-playlist",
                "--no-cache-dir",
                "--no-mtime",
                "--no-warnings",
                "--output",
                "/srv/media/%(title).150B [%(id)s].%(ext)s",
                "--user-agent",
                "agent/1.0",
                "--add-header",
                "Accept-Language: ja-JP",
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "320K",
            ]
        );
    }

    #[test]
    fn test_forced_run_and_passthrough_render_last() {
        let args = common_args(&options(
            DownloadType::Video,
            Some("--limit-rate 1M --no-part"),
            true,
        ));

        assert!(args.contains(&"--force-overwrites".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--limit-rate", "1M", "--no-part"]);
    }

    #[test]
    fn test_url_follows_option_terminator() {
        let opts = options(DownloadType::Video, None, false);
        for args in [
            probe_args("https://example.com/v", &opts),
            fetch_args("https://example.com/v", &opts),
        ] {
            assert_eq!(&args[args.len() - 2..], ["--", "https://example.com/v"]);
        }
    }

    #[test]
    fn test_parse_probe_output() {
        let stdout = "[mediaq:title] Sample\n[mediaq:file] /srv/media/Sample [abc].webm\n";
        assert_eq!(
            parse_probe_output(stdout),
            (
                Some("Sample".to_string()),
                Some(PathBuf::from("/srv/media/Sample [abc].webm"))
            )
        );

        let (title, path) = parse_probe_output("noise\n[mediaq:title] NA\n");
        assert!(title.is_none());
        assert!(path.is_none());
    }

    #[test]
    fn test_parse_progress_lines() {
        let line = "[mediaq:progress] downloading|450|1000|NA|/srv/media/a|b.webm.part";
        assert_eq!(
            parse_fetch_line(line),
            Some(FetchLine::Progress(ProgressEvent {
                status: ProgressStatus::Downloading,
                downloaded_bytes: Some(450),
                total_bytes: Some(1000),
                total_bytes_estimate: None,
                filename: Some(PathBuf::from("/srv/media/a|b.webm.part")),
            }))
        );

        let line = "[mediaq:progress] downloading|10|NA|2048.5|NA\r";
        assert_eq!(
            parse_fetch_line(line),
            Some(FetchLine::Progress(ProgressEvent {
                status: ProgressStatus::Downloading,
                downloaded_bytes: Some(10),
                total_bytes: None,
                total_bytes_estimate: Some(2048),
                filename: None,
            }))
        );

        let line = "[mediaq:progress] finished|1000|1000|NA|/srv/media/a.webm";
        assert!(matches!(
            parse_fetch_line(line),
            Some(FetchLine::Progress(ProgressEvent {
                status: ProgressStatus::Finished,
                ..
            }))
        ));

        assert_eq!(parse_fetch_line("[mediaq:progress] error|NA|NA|NA|NA"), None);
        assert_eq!(parse_fetch_line("[download] Destination: x.webm"), None);
    }

    #[test]
    fn test_parse_final_path_line() {
        assert_eq!(
            parse_fetch_line("[mediaq:final] /srv/media/Sample [abc].mp3"),
            Some(FetchLine::FinalPath(PathBuf::from(
                "/srv/media/Sample [abc].mp3"
            )))
        );
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "WARNING: something\nERROR: [generic] Unable to download webpage: <urlopen error [Errno 101] Network is unreachable>\n",
            failed_status(),
        );
        assert!(matches!(err, DownloadError::Network(_)));
        assert!(err.to_string().starts_with("[generic] Unable to download webpage"));

        let err = classify_failure(
            "ERROR: Postprocessing: ffprobe and ffmpeg not found\n",
            failed_status(),
        );
        assert!(matches!(err, DownloadError::Postprocess(_)));

        let err = classify_failure(
            "ERROR: [youtube] abc: Video unavailable\n",
            failed_status(),
        );
        assert!(matches!(err, DownloadError::Extraction(_)));
        assert_eq!(err.to_string(), "[youtube] abc: Video unavailable");

        let err = classify_failure("", failed_status());
        assert!(err.to_string().starts_with("yt-dlp exited with"));
    }
}
