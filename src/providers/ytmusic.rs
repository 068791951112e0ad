//! YouTube Music search via `rustypipe`
//!
//! Queries the YouTube Music "songs" tab and maps the results to [`Track`]s.

use super::{MusicSearch, SearchError, Track};
use async_trait::async_trait;
use rustypipe::client::RustyPipe;
use rustypipe::model::TrackItem;
use tracing::{debug, info, instrument};

/// Search adapter backed by the YouTube Music web API
pub struct YtMusicSearch {
    client: RustyPipe,
}

impl Default for YtMusicSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl YtMusicSearch {
    /// Create a search adapter with a default `RustyPipe` client
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: RustyPipe::new(),
        }
    }
}

/// Convert a YouTube Music result into a [`Track`]
fn track_from_item(item: TrackItem) -> Track {
    let thumbnail_url = item
        .cover
        .iter()
        .max_by_key(|thumb| thumb.width)
        .map(|thumb| thumb.url.clone());

    Track {
        title: item.name,
        artists: item.artists.into_iter().map(|artist| artist.name).collect(),
        album: item.album.map(|album| album.name),
        duration_secs: item.duration,
        thumbnail_url,
        video_id: item.id,
    }
}

#[async_trait]
impl MusicSearch for YtMusicSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let result = self
            .client
            .query()
            .music_search_tracks(query)
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        let tracks: Vec<Track> = result
            .items
            .items
            .into_iter()
            .take(limit)
            .map(track_from_item)
            .collect();

        debug!(count = tracks.len(), "Mapped YouTube Music results");
        info!(query = %query, results = tracks.len(), "Music search finished");

        Ok(tracks)
    }
}
