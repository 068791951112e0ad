//! Utility functions for text shaping, file naming and Telegram retries.

// lazy_regex! is backed by once_cell; patterns are validated at compile time
#![allow(clippy::non_std_lazy_statics)]

use anyhow::Result;
use lazy_regex::lazy_regex;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Characters not allowed in generated file names
static RE_UNSAFE_FILENAME: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[^A-Za-z0-9 _-]");

/// Maximum length of a sanitized file name stem
pub const MAX_FILENAME_STEM: usize = 40;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use ytmusic_dl_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Truncates to a number of grapheme clusters, appending an ellipsis when cut.
#[must_use]
pub fn truncate_graphemes(s: &str, max_graphemes: usize) -> String {
    let mut graphemes = s.graphemes(true);
    let head: String = graphemes.by_ref().take(max_graphemes).collect();
    if graphemes.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}

/// Truncates to a number of characters, appending an ellipsis when cut.
///
/// Unlike [`truncate_graphemes`] the bound is on `char`s, so the output is
/// never longer than `max_chars + 1` chars.
#[must_use]
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    format!("{}…", truncate_str(s, max_chars).trim_end())
}

/// Turns a track title into a file-system safe name stem.
///
/// Anything outside `[A-Za-z0-9 _-]` becomes `_`, surrounding whitespace is
/// trimmed and the result is capped at [`MAX_FILENAME_STEM`] characters.
/// Falls back to `track` when nothing usable remains.
///
/// # Examples
///
/// ```
/// use ytmusic_dl_bot::utils::sanitize_filename;
/// assert_eq!(sanitize_filename("AC/DC: Back in Black"), "AC_DC_ Back in Black");
/// ```
#[must_use]
pub fn sanitize_filename(title: &str) -> String {
    let replaced = RE_UNSAFE_FILENAME.replace_all(title, "_");
    let stem = truncate_str(replaced.trim(), MAX_FILENAME_STEM)
        .trim()
        .to_string();
    if stem.is_empty() {
        "track".to_string()
    } else {
        stem
    }
}

/// Retry a Telegram API operation with exponential backoff.
///
/// The retry strategy uses exponential backoff with jitter:
/// - Initial delay: 500ms
/// - Max delay: 4s
/// - Retries: 3 after the first attempt, 4 attempts in total (see constants in `config.rs`)
///
/// # Examples
///
/// ```no_run
/// use ytmusic_dl_bot::utils::retry_telegram_operation;
/// use anyhow::Result;
///
/// async fn edit_status() -> Result<()> {
///     Ok(())
/// }
///
/// # async fn example() -> Result<()> {
/// retry_telegram_operation(|| async { edit_status().await }).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns the last error if every attempt fails.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES + 1,
            e
        );
        e
    })
}
