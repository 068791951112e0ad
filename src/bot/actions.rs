//! Chat-independent flow behind the handlers
//!
//! These functions own every decision about sessions, search and download;
//! the Telegram handlers only translate their outcomes into API calls.

use super::views::{BotView, CallbackAction};
use crate::providers::{AudioDownloader, DownloadedAudio, MusicSearch, SearchError, Track};
use crate::session::{Direction, Navigation, Session, SessionStore};
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::Path;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of handling a search query
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// New session stored; render its first track
    Results(Session),
    /// Nothing to show; any previous session was dropped
    NoResults,
    /// Query was blank; the session was left untouched
    EmptyQuery,
}

/// Result of handling an inline button press
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Index moved; re-render with this session
    Render(Session),
    /// Boundary press; nothing to do
    Unchanged,
    /// Download this track
    Download(Track),
    /// Session removed; prompt for a new query
    Restarted,
    /// No session, a press from an older search, or index out of range
    Expired,
}

/// Destination for a finished MP3
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver the file to the user
    async fn upload(&self, audio: &DownloadedAudio) -> anyhow::Result<()>;
}

/// Result of producing an MP3
#[derive(Debug)]
pub enum DownloadOutcome {
    /// File is on disk and ready to upload
    Ready(DownloadedAudio),
    /// User-facing failure text
    Failed(String),
}

/// Run a search and store its results as the user's session.
pub async fn run_search<Id>(
    store: &SessionStore<Id>,
    search: &dyn MusicSearch,
    user: Id,
    query: &str,
    limit: usize,
) -> SearchOutcome
where
    Id: Hash + Eq + Clone + Send + Sync + Debug + 'static,
{
    let query = query.trim();
    if query.is_empty() {
        return SearchOutcome::EmptyQuery;
    }

    let tracks = match search.search(query, limit).await {
        Ok(tracks) => tracks,
        Err(SearchError::EmptyQuery) => return SearchOutcome::EmptyQuery,
        Err(e) => {
            error!(user_id = ?user, query = %query, error = %e, "Search failed");
            Vec::new()
        }
    };

    match store.start(user.clone(), tracks).await {
        Some(session) => {
            info!(user_id = ?user, query = %query, results = session.len(), "Search results stored");
            SearchOutcome::Results(session)
        }
        None => {
            info!(user_id = ?user, query = %query, "Search returned no results");
            SearchOutcome::NoResults
        }
    }
}

/// Apply a button press to the user's session.
///
/// Presses carrying the id of an older search are treated as expired and
/// never touch the current session.
pub async fn apply_action<Id>(
    store: &SessionStore<Id>,
    user: &Id,
    action: CallbackAction,
) -> ActionOutcome
where
    Id: Hash + Eq + Clone + Send + Sync + Debug + 'static,
{
    let navigate = |session_id: Uuid, direction| async move {
        match store.navigate(user, session_id, direction).await {
            Navigation::Moved(session) => ActionOutcome::Render(session),
            Navigation::Unchanged => ActionOutcome::Unchanged,
            Navigation::Missing => ActionOutcome::Expired,
        }
    };

    match action {
        CallbackAction::Previous(session_id) => navigate(session_id, Direction::Previous).await,
        CallbackAction::Next(session_id) => navigate(session_id, Direction::Next).await,
        CallbackAction::Download(session_id, index) => store
            .track_at(user, session_id, index)
            .await
            .map_or(ActionOutcome::Expired, ActionOutcome::Download),
        CallbackAction::Restart(session_id) => {
            if store.clear(user, session_id).await {
                ActionOutcome::Restarted
            } else {
                ActionOutcome::Expired
            }
        }
    }
}

/// Produce an MP3 for `track`, mapping failures to user-facing text.
pub async fn run_download<V: BotView>(
    downloader: &dyn AudioDownloader,
    track: &Track,
) -> DownloadOutcome {
    match downloader.download(track).await {
        Ok(audio) => DownloadOutcome::Ready(audio),
        Err(e) => {
            warn!(video_id = %track.video_id, error = %e, "Download failed");
            DownloadOutcome::Failed(V::download_failed(&e))
        }
    }
}

/// Delete a produced file, logging instead of failing.
pub async fn discard_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = ?path, "Removed downloaded file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "Failed to remove downloaded file"),
    }
}

/// Upload `audio` through `sink`, then remove the file whatever the result.
///
/// # Errors
///
/// Returns the upload error after the file has been removed.
pub async fn upload_and_discard(
    sink: &dyn AudioSink,
    audio: &DownloadedAudio,
) -> anyhow::Result<()> {
    let result = sink.upload(audio).await;
    discard_file(&audio.path).await;
    result
}
