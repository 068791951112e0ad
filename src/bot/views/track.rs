//! Track browsing UI components
//!
//! Contains callback payloads, keyboards, captions and text messages shown
//! while searching, browsing and downloading.

use crate::providers::DownloadError;
use crate::session::Session;
use crate::utils::{truncate_graphemes, truncate_with_ellipsis};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Callback constants
// ─────────────────────────────────────────────────────────────────────────────

/// Callback data prefix for showing the previous result (`prev:<search>`)
pub const CALLBACK_PREV: &str = "prev";
/// Callback data prefix for showing the next result (`next:<search>`)
pub const CALLBACK_NEXT: &str = "next";
/// Callback data prefix for downloading a result (`dl:<search>:<index>`)
pub const CALLBACK_DOWNLOAD: &str = "dl";
/// Callback data prefix for dropping the results (`restart:<search>`)
pub const CALLBACK_RESTART: &str = "restart";

/// Telegram's photo caption limit, in UTF-16 code units
pub const MAX_CAPTION_LEN: usize = 1024;

// Field budgets in chars; each char is at most two UTF-16 units, so a full
// caption stays well under MAX_CAPTION_LEN
const MAX_CAPTION_TITLE: usize = 200;
const MAX_CAPTION_ARTISTS: usize = 150;
const MAX_CAPTION_ALBUM: usize = 100;

/// A decoded inline button press.
///
/// Every action names the search it was rendered for, so presses on an older
/// result message never act on a newer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Show the previous result
    Previous(Uuid),
    /// Show the next result
    Next(Uuid),
    /// Download the result at this index
    Download(Uuid, usize),
    /// Clear the results and ask for a new query
    Restart(Uuid),
}

impl CallbackAction {
    /// Decode callback data; `None` for unknown payloads
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let kind = parts.next()?;
        let session = Uuid::try_parse(parts.next()?).ok()?;

        let action = match kind {
            CALLBACK_PREV => Self::Previous(session),
            CALLBACK_NEXT => Self::Next(session),
            CALLBACK_RESTART => Self::Restart(session),
            CALLBACK_DOWNLOAD => Self::Download(session, parts.next()?.parse().ok()?),
            _ => return None,
        };

        parts.next().is_none().then_some(action)
    }

    /// Encode as callback data (at most 64 bytes)
    #[must_use]
    pub fn to_data(self) -> String {
        match self {
            Self::Previous(session) => format!("{CALLBACK_PREV}:{}", session.as_simple()),
            Self::Next(session) => format!("{CALLBACK_NEXT}:{}", session.as_simple()),
            Self::Download(session, index) => {
                format!("{CALLBACK_DOWNLOAD}:{}:{index}", session.as_simple())
            }
            Self::Restart(session) => format!("{CALLBACK_RESTART}:{}", session.as_simple()),
        }
    }

    /// Search this press belongs to
    #[must_use]
    pub const fn session_id(self) -> Uuid {
        match self {
            Self::Previous(session)
            | Self::Next(session)
            | Self::Download(session, _)
            | Self::Restart(session) => session,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards and captions
// ─────────────────────────────────────────────────────────────────────────────

/// Keyboard for the track currently shown in `session`.
///
/// Previous and Next only appear when they would move.
#[must_use]
pub fn track_keyboard(session: &Session) -> InlineKeyboardMarkup {
    let sid = session.id();

    let mut navigation = Vec::with_capacity(2);
    if session.has_previous() {
        navigation.push(InlineKeyboardButton::callback(
            "⬅️ Prev",
            CallbackAction::Previous(sid).to_data(),
        ));
    }
    if session.has_next() {
        navigation.push(InlineKeyboardButton::callback(
            "Next ➡️",
            CallbackAction::Next(sid).to_data(),
        ));
    }

    let actions = vec![
        InlineKeyboardButton::callback(
            "⬇️ Download",
            CallbackAction::Download(sid, session.index()).to_data(),
        ),
        InlineKeyboardButton::callback("🔄 Restart", CallbackAction::Restart(sid).to_data()),
    ];

    let mut rows = Vec::with_capacity(2);
    if !navigation.is_empty() {
        rows.push(navigation);
    }
    rows.push(actions);
    InlineKeyboardMarkup::new(rows)
}

/// HTML caption for the track currently shown in `session`.
///
/// Free-text fields are clipped so the rendered text fits [`MAX_CAPTION_LEN`].
#[must_use]
pub fn track_caption(session: &Session) -> String {
    let track = session.current();
    let title = truncate_with_ellipsis(&track.title, MAX_CAPTION_TITLE);
    let artists = truncate_with_ellipsis(&track.artist_line(), MAX_CAPTION_ARTISTS);

    let mut lines = vec![
        format!("<b>{}</b>", html_escape::encode_text(&title)),
        html_escape::encode_text(&artists).into_owned(),
    ];
    if let Some(album) = &track.album {
        let album = truncate_with_ellipsis(album, MAX_CAPTION_ALBUM);
        lines.push(format!("💿 {}", html_escape::encode_text(&album)));
    }
    if let Some(duration) = track.duration_label() {
        lines.push(format!("⏱ {duration}"));
    }
    lines.push(format!("\n{}/{}", session.index() + 1, session.len()));
    lines.join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait definition
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for bot text rendering
pub trait BotView {
    /// Greeting for `/start`
    fn welcome_message() -> &'static str;

    /// Prompt after Restart
    fn prompt_new_query() -> &'static str;

    /// Reply to a blank text message
    fn empty_query() -> &'static str;

    /// Status while a search is running
    fn searching(query: &str) -> String;

    /// Search returned nothing or failed
    fn no_results(query: &str) -> String;

    /// Button pressed without a usable session
    fn session_expired() -> &'static str;

    /// Download pressed while the user's previous download is running
    fn download_in_progress() -> &'static str;

    /// Status while yt-dlp runs
    fn downloading(title: &str) -> String;

    /// Status while the file is uploaded
    fn uploading() -> &'static str;

    /// Upload failed after the file was produced
    fn upload_failed() -> &'static str;

    /// User-facing text for a failed download
    fn download_failed(error: &DownloadError) -> String;
}

// ─────────────────────────────────────────────────────────────────────────────
// Default implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Default English-language implementation of `BotView`
pub struct DefaultBotView;

impl BotView for DefaultBotView {
    fn welcome_message() -> &'static str {
        "🎵 Hi! Send me a song name and I'll find it on YouTube Music.\n\nBrowse the results with ⬅️ / ➡️ and press ⬇️ Download to get an MP3."
    }

    fn prompt_new_query() -> &'static str {
        "🎵 Send me another song name."
    }

    fn empty_query() -> &'static str {
        "✏️ Send me a song name to search for."
    }

    fn searching(query: &str) -> String {
        format!("🔎 Searching: {}…", truncate_graphemes(query, 100))
    }

    fn no_results(query: &str) -> String {
        format!(
            "😕 No results found for \"{}\". Try another song name.",
            truncate_graphemes(query, 100)
        )
    }

    fn session_expired() -> &'static str {
        "⌛ This search has expired. Send a new song name."
    }

    fn download_in_progress() -> &'static str {
        "⏳ Your previous download is still running. Please wait for it to finish."
    }

    fn downloading(title: &str) -> String {
        format!("⏳ Downloading: {}…", truncate_graphemes(title, 100))
    }

    fn uploading() -> &'static str {
        "📤 Uploading…"
    }

    fn upload_failed() -> &'static str {
        "❌ Upload to Telegram failed. Please try again."
    }

    fn download_failed(error: &DownloadError) -> String {
        match error {
            DownloadError::InvalidId(_) => {
                "❌ This track has no downloadable source.".to_string()
            }
            DownloadError::Unavailable(_) => {
                "❌ This track is unavailable (private, removed or region-blocked).".to_string()
            }
            DownloadError::TooLarge { size_mb, limit_mb } => format!(
                "❌ File is too large for Telegram: {size_mb:.1} MB (max {limit_mb:.0} MB)."
            ),
            DownloadError::Spawn(_)
            | DownloadError::AllSourcesFailed { .. }
            | DownloadError::MissingOutput
            | DownloadError::Io(_) => "❌ Download failed. Please try again later.".to_string(),
        }
    }
}
