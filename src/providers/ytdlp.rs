//! yt-dlp download adapter
//!
//! Fetches the best audio stream for a track and transcodes it to MP3 with
//! `yt-dlp -x` (ffmpeg must be on `PATH`). YouTube is tried first; public
//! Invidious mirrors act as fallback sources when YouTube refuses the server.

use super::{AudioDownloader, DownloadError, DownloadedAudio, Track};
use crate::config::Settings;
use crate::utils::{sanitize_filename, truncate_str};
use async_trait::async_trait;
use lazy_regex::regex_is_match;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Patterns indicating fatal, unrecoverable yt-dlp errors.
/// Other sources serve the same video, so these stop the fallback.
const FATAL_ERROR_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "Sign in to confirm your age",
    "age-restricted",
    "members-only",
    "This video is private",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "geo-restricted",
    "who has blocked it on copyright grounds",
    "copyright claim",
    "terminated account",
    "This video has been removed",
    "Premieres in",
    "This live event will begin",
    "Join this channel to get access",
];

/// Patterns indicating transient errors that might be resolved with retry
const RETRYABLE_ERROR_PATTERNS: &[&str] = &[
    "Connection reset",
    "Connection timed out",
    "Unable to download webpage",
    "HTTP Error 429", // Too Many Requests
    "HTTP Error 503", // Service Unavailable
    "Read timed out",
    "network is unreachable",
    "Temporary failure in name resolution",
];

/// Stderr kept in error messages
const MAX_ERROR_LENGTH: usize = 500;

/// Check if error message indicates a fatal, unrecoverable error
fn is_fatal_ytdlp_error(error_msg: &str) -> bool {
    FATAL_ERROR_PATTERNS
        .iter()
        .any(|pattern| error_msg.contains(pattern))
}

/// Check if error message indicates a retryable error
fn is_retryable_ytdlp_error(error_msg: &str) -> bool {
    RETRYABLE_ERROR_PATTERNS
        .iter()
        .any(|pattern| error_msg.contains(pattern))
}

/// Where a download attempt fetches from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// youtube.com itself
    Direct(String),
    /// An Invidious front-end
    Mirror(String),
}

impl Source {
    /// Watch URL passed to yt-dlp
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Direct(url) | Self::Mirror(url) => url,
        }
    }
}

/// `<title>_<video id>_<uuid>.<ext>`, the names [`YtDlpDownloader`] writes
fn is_download_artifact(file_name: &str) -> bool {
    regex_is_match!(r"_[A-Za-z0-9_-]{11}_[0-9a-f]{32}\.[A-Za-z0-9.]+$", file_name)
}

enum AttemptError {
    Spawn(String),
    Failed(String),
}

/// Downloader that shells out to `yt-dlp`
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    binary: String,
    downloads_dir: PathBuf,
    audio_quality: String,
    mirrors: Vec<String>,
    max_upload_bytes: u64,
}

impl YtDlpDownloader {
    /// Create a downloader with no mirrors and default quality/limits
    #[must_use]
    pub fn new(binary: impl Into<String>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            downloads_dir: downloads_dir.into(),
            audio_quality: "192K".to_string(),
            mirrors: Vec::new(),
            max_upload_bytes: crate::config::TELEGRAM_UPLOAD_LIMIT,
        }
    }

    /// Create a downloader from application settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.ytdlp_path.clone(), settings.downloads_path())
            .with_audio_quality(settings.audio_quality.clone())
            .with_mirrors(settings.invidious_instances())
            .with_max_upload_bytes(settings.max_upload_bytes)
    }

    /// Set Invidious base URLs tried after YouTube
    #[must_use]
    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Set the value passed to `--audio-quality`
    #[must_use]
    pub fn with_audio_quality(mut self, quality: impl Into<String>) -> Self {
        self.audio_quality = quality.into();
        self
    }

    /// Set the largest output accepted for upload
    #[must_use]
    pub const fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Directory where MP3 files are written
    #[must_use]
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Create the downloads directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure_downloads_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.downloads_dir).await
    }

    /// Remove files left by downloads that never finished, eg. after a crash.
    ///
    /// Only names this downloader produces are touched. Returns how many
    /// files were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub async fn sweep_downloads_dir(&self) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.downloads_dir).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if !is_file || !is_download_artifact(&name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(error = %e, path = ?entry.path(), "Failed to remove stale download");
                }
            }
        }

        Ok(removed)
    }

    /// Download sources in the order they are tried: YouTube, then mirrors
    /// in random order so load spreads across instances.
    #[must_use]
    pub fn candidate_sources(&self, track: &Track) -> Vec<Source> {
        let mut mirrors = self.mirrors.clone();
        mirrors.shuffle(&mut rand::rng());

        std::iter::once(Source::Direct(track.watch_url()))
            .chain(mirrors.into_iter().map(|base| {
                Source::Mirror(format!("{base}/watch?v={}", track.video_id))
            }))
            .collect()
    }

    fn ytdlp_args(&self, source: &Source, output_template: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "bestaudio/best".to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            self.audio_quality.clone(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().into_owned(),
        ];

        // The iOS player client gets past some of YouTube's server blocks
        if matches!(source, Source::Direct(_)) {
            args.push("--extractor-args".to_string());
            args.push("youtube:player_client=ios".to_string());
        }

        args.push(source.url().to_string());
        args
    }

    /// Execute yt-dlp and map a non-zero exit to its stderr
    async fn exec_ytdlp(&self, args: &[String]) -> Result<(), AttemptError> {
        debug!(binary = %self.binary, ?args, "Executing yt-dlp command");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AttemptError::Spawn(format!("{}: {e}", self.binary)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let error_msg = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            stderr.into_owned()
        };
        Err(AttemptError::Failed(truncate_str(
            error_msg.trim(),
            MAX_ERROR_LENGTH,
        )))
    }

    /// Remove leftovers (`.part`, `.webm`, ...) sharing the attempt's file stem
    async fn cleanup_partials(&self, stem: &str) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.downloads_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(stem) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(error = %e, path = ?entry.path(), "Failed to remove partial download");
                }
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    async fn check_size(&self, path: &Path) -> Result<u64, DownloadError> {
        let size_bytes = tokio::fs::metadata(path).await?.len();
        if size_bytes > self.max_upload_bytes {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(error = %e, path = ?path, "Failed to remove oversize download");
            }
            return Err(DownloadError::TooLarge {
                size_mb: size_bytes as f64 / 1024.0 / 1024.0,
                limit_mb: self.max_upload_bytes as f64 / 1024.0 / 1024.0,
            });
        }
        Ok(size_bytes)
    }
}

#[async_trait]
impl AudioDownloader for YtDlpDownloader {
    #[instrument(skip(self, track), fields(video_id = %track.video_id))]
    async fn download(&self, track: &Track) -> Result<DownloadedAudio, DownloadError> {
        if !track.has_valid_id() {
            return Err(DownloadError::InvalidId(track.video_id.clone()));
        }

        self.ensure_downloads_dir().await?;

        let safe_title = sanitize_filename(&track.title);
        let stem = format!(
            "{safe_title}_{}_{}",
            track.video_id,
            Uuid::new_v4().as_simple()
        );
        let output_template = self.downloads_dir.join(format!("{stem}.%(ext)s"));
        let expected = self.downloads_dir.join(format!("{stem}.mp3"));

        let sources = self.candidate_sources(track);
        let attempts = sources.len();
        let mut last_error = String::new();
        let mut produced = false;

        for source in &sources {
            info!(url = %source.url(), mirror = matches!(source, Source::Mirror(_)), "Trying download source");

            match self.exec_ytdlp(&self.ytdlp_args(source, &output_template)).await {
                Ok(()) => {
                    if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
                        produced = true;
                        break;
                    }
                    warn!(url = %source.url(), "yt-dlp succeeded but MP3 is missing");
                    last_error = DownloadError::MissingOutput.to_string();
                }
                Err(AttemptError::Spawn(e)) => {
                    warn!(error = %e, "Failed to start yt-dlp");
                    return Err(DownloadError::Spawn(e));
                }
                Err(AttemptError::Failed(error_msg)) => {
                    if is_fatal_ytdlp_error(&error_msg) {
                        warn!(error = %error_msg, "Fatal yt-dlp error detected");
                        self.cleanup_partials(&stem).await;
                        return Err(DownloadError::Unavailable(error_msg));
                    }
                    if is_retryable_ytdlp_error(&error_msg) {
                        warn!(error = %error_msg, url = %source.url(), "Retryable yt-dlp error, trying next source");
                    } else {
                        warn!(error = %error_msg, url = %source.url(), "yt-dlp failed, trying next source");
                    }
                    last_error = error_msg;
                }
            }
        }

        if !produced {
            self.cleanup_partials(&stem).await;
            if last_error == DownloadError::MissingOutput.to_string() {
                return Err(DownloadError::MissingOutput);
            }
            return Err(DownloadError::AllSourcesFailed {
                attempts,
                last_error,
            });
        }

        let size_bytes = self.check_size(&expected).await?;
        info!(path = ?expected, size_bytes, "Audio ready");

        Ok(DownloadedAudio {
            path: expected,
            file_name: format!("{safe_title}.mp3"),
            title: track.title.clone(),
            performer: track.artist_line(),
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(is_fatal_ytdlp_error("ERROR: [youtube] abc: Video unavailable"));
        assert!(is_fatal_ytdlp_error("ERROR: Private video. Sign in"));
        assert!(!is_fatal_ytdlp_error("ERROR: HTTP Error 429: Too Many Requests"));

        assert!(is_retryable_ytdlp_error("ERROR: HTTP Error 429: Too Many Requests"));
        assert!(is_retryable_ytdlp_error("Read timed out."));
        assert!(!is_retryable_ytdlp_error("ERROR: Requested format is not available"));
    }

    #[test]
    fn test_candidate_sources_direct_first() {
        let downloader = YtDlpDownloader::new("yt-dlp", "downloads").with_mirrors(vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
        ]);
        let track = Track {
            title: "Imagine".to_string(),
            artists: Vec::new(),
            album: None,
            duration_secs: None,
            thumbnail_url: None,
            video_id: "YkgkThdzX-8".to_string(),
        };
        let sources = downloader.candidate_sources(&track);

        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0], Source::Direct(track.watch_url()));
        let mut mirrors: Vec<&str> = sources[1..].iter().map(Source::url).collect();
        mirrors.sort_unstable();
        assert_eq!(
            mirrors,
            vec![
                "https://a.example/watch?v=YkgkThdzX-8",
                "https://b.example/watch?v=YkgkThdzX-8",
            ]
        );
    }

    #[test]
    fn test_download_artifact_names() {
        let uuid = "0123456789abcdef0123456789abcdef";
        assert!(is_download_artifact(&format!("Imagine_YkgkThdzX-8_{uuid}.mp3")));
        assert!(is_download_artifact(&format!("x_YkgkThdzX-8_{uuid}.webm.part")));
        assert!(!is_download_artifact("notes.txt"));
        assert!(!is_download_artifact(&format!("Imagine_short_{uuid}.mp3")));
    }

    #[test]
    fn test_ios_client_only_for_direct_source() {
        let downloader = YtDlpDownloader::new("yt-dlp", "downloads").with_audio_quality("320K");
        let template = Path::new("downloads/x.%(ext)s");

        let direct = downloader.ytdlp_args(
            &Source::Direct("https://www.youtube.com/watch?v=YkgkThdzX-8".to_string()),
            template,
        );
        assert!(direct.contains(&"youtube:player_client=ios".to_string()));
        assert!(direct.contains(&"320K".to_string()));
        assert_eq!(
            direct.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=YkgkThdzX-8")
        );

        let mirror = downloader.ytdlp_args(
            &Source::Mirror("https://a.example/watch?v=YkgkThdzX-8".to_string()),
            template,
        );
        assert!(!mirror.contains(&"--extractor-args".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_id_rejected_before_spawn() {
        // The binary does not exist; an id check failure must come first
        let downloader = YtDlpDownloader::new("/nonexistent/yt-dlp", std::env::temp_dir());
        let track = Track {
            title: "x".to_string(),
            artists: Vec::new(),
            album: None,
            duration_secs: None,
            thumbnail_url: None,
            video_id: String::new(),
        };

        let err = downloader.download(&track).await.expect_err("must fail");
        assert!(matches!(err, DownloadError::InvalidId(_)));
    }
}
