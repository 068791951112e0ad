//! Search and download adapters
//!
//! Both adapters sit behind traits so handlers can be driven by test doubles.

pub mod ytdlp;
pub mod ytmusic;

pub use ytdlp::YtDlpDownloader;
pub use ytmusic::YtMusicSearch;

use async_trait::async_trait;
use lazy_regex::regex_is_match;
use std::path::PathBuf;
use thiserror::Error;

/// One search result describing a song candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Song title
    pub title: String,
    /// Performing artists in credit order
    pub artists: Vec<String>,
    /// Album name, if the result belongs to one
    pub album: Option<String>,
    /// Length in seconds
    pub duration_secs: Option<u32>,
    /// Cover image URL
    pub thumbnail_url: Option<String>,
    /// YouTube video id
    pub video_id: String,
}

impl Track {
    /// Artists joined for display
    #[must_use]
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            "Unknown artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }

    /// Duration as `m:ss` (or `h:mm:ss` for long tracks)
    #[must_use]
    pub fn duration_label(&self) -> Option<String> {
        self.duration_secs.map(|total| {
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            let seconds = total % 60;
            if hours > 0 {
                format!("{hours}:{minutes:02}:{seconds:02}")
            } else {
                format!("{minutes}:{seconds:02}")
            }
        })
    }

    /// Whether the source identifier looks like a YouTube video id
    #[must_use]
    pub fn has_valid_id(&self) -> bool {
        regex_is_match!(r"^[A-Za-z0-9_-]{11}$", &self.video_id)
    }

    /// Canonical YouTube watch URL
    #[must_use]
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

/// Errors that can occur during a music search
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query was empty after trimming
    #[error("Empty search query")]
    EmptyQuery,
    /// Request to the music service failed
    #[error("Search request failed: {0}")]
    Network(String),
}

/// Errors that can occur while producing an MP3
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Source identifier is not a YouTube video id
    #[error("Invalid video id: {0:?}")]
    InvalidId(String),
    /// Downloader binary could not be started
    #[error("Failed to start downloader: {0}")]
    Spawn(String),
    /// Source reported an unrecoverable error (unavailable, private, blocked)
    #[error("Video cannot be downloaded: {0}")]
    Unavailable(String),
    /// Every candidate source failed
    #[error("All {attempts} download sources failed; last error: {last_error}")]
    AllSourcesFailed {
        /// Number of sources tried
        attempts: usize,
        /// Error text from the last attempt
        last_error: String,
    },
    /// Downloader exited successfully but produced no MP3
    #[error("Downloader finished but no MP3 was produced")]
    MissingOutput,
    /// Output exceeds the upload limit
    #[error("File too large: {size_mb:.1} MB (max {limit_mb:.0} MB)")]
    TooLarge {
        /// Output size in MiB
        size_mb: f64,
        /// Limit in MiB
        limit_mb: f64,
    },
    /// Local file system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An MP3 ready to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedAudio {
    /// Location of the file on disk
    pub path: PathBuf,
    /// File name shown to the user
    pub file_name: String,
    /// Audio title tag
    pub title: String,
    /// Audio performer tag
    pub performer: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Free-text music search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSearch: Send + Sync {
    /// Return up to `limit` tracks in the service's relevance order
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SearchError>;
}

/// Fetch and transcode a track to MP3
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    /// Produce an MP3 for `track` on local disk
    async fn download(&self, track: &Track) -> Result<DownloadedAudio, DownloadError>;
}
