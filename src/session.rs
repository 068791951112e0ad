//! Per-user browsing sessions
//!
//! A session holds the tracks returned by the user's last search and the
//! index of the one currently on screen. The store is created once by the
//! runner and handed to handlers as a dispatcher dependency.

use crate::providers::Track;
use std::collections::HashMap;
use std::hash::Hash;
use teloxide::types::UserId;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Direction of a navigation button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the first result
    Previous,
    /// Towards the last result
    Next,
}

/// Search results being browsed by one user.
///
/// Always holds at least one track and `index < tracks.len()`. Every search
/// gets a fresh `id`, which result keyboards carry so presses on an older
/// message can be told apart from the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: Uuid,
    tracks: Vec<Track>,
    index: usize,
}

impl Session {
    /// Start browsing `tracks` at the first result.
    ///
    /// Returns `None` for an empty result list, so an empty session can never
    /// be rendered.
    #[must_use]
    pub fn new(tracks: Vec<Track>) -> Option<Self> {
        if tracks.is_empty() {
            None
        } else {
            Some(Self {
                id: Uuid::new_v4(),
                tracks,
                index: 0,
            })
        }
    }

    /// Identifier of the search that produced this session
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Track currently on screen
    #[must_use]
    pub fn current(&self) -> &Track {
        &self.tracks[self.index]
    }

    /// Track at `index`, if it exists
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Zero-based index of the current track
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of tracks in the session
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether a Previous press would move
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.index > 0
    }

    /// Whether a Next press would move
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.index + 1 < self.tracks.len()
    }

    /// Move one step, clamping at both ends.
    ///
    /// Returns `true` if the index changed.
    pub fn step(&mut self, direction: Direction) -> bool {
        let before = self.index;
        self.index = match direction {
            Direction::Next => (self.index + 1).min(self.tracks.len() - 1),
            Direction::Previous => self.index.saturating_sub(1),
        };
        self.index != before
    }
}

/// Result of a navigation request against the store
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Index changed; carries the updated session
    Moved(Session),
    /// Already at the boundary; nothing to re-render
    Unchanged,
    /// No session for this user, or the press came from an older search
    Missing,
}

/// Process-wide map of sessions keyed by user.
///
/// Generic over the key so tests can use plain integers; the bot uses
/// [`TelegramSessionStore`].
pub struct SessionStore<Id: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static> {
    sessions: RwLock<HashMap<Id, Session>>,
}

impl<Id: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static> Default
    for SessionStore<Id>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static> SessionStore<Id> {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the user's session with fresh search results.
    ///
    /// An empty result list removes any previous session and returns `None`.
    pub async fn start(&self, id: Id, tracks: Vec<Track>) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        match Session::new(tracks) {
            Some(session) => {
                debug!(user_id = ?id, tracks = session.len(), "Session started");
                sessions.insert(id, session.clone());
                Some(session)
            }
            None => {
                sessions.remove(&id);
                None
            }
        }
    }

    /// Snapshot of the user's session
    pub async fn get(&self, id: &Id) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Step the user's session in `direction` if it is still search `session_id`
    pub async fn navigate(&self, id: &Id, session_id: Uuid, direction: Direction) -> Navigation {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id).filter(|s| s.id == session_id) else {
            return Navigation::Missing;
        };

        if session.step(direction) {
            Navigation::Moved(session.clone())
        } else {
            Navigation::Unchanged
        }
    }

    /// Track at `index` in the user's session, if it is still search `session_id`
    pub async fn track_at(&self, id: &Id, session_id: Uuid, index: usize) -> Option<Track> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|s| s.id == session_id)
            .and_then(|s| s.get(index))
            .cloned()
    }

    /// Remove the user's session if it is still search `session_id`.
    ///
    /// Returns `true` if a session was removed.
    pub async fn clear(&self, id: &Id, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        if !matches!(sessions.get(id), Some(s) if s.id == session_id) {
            return false;
        }
        sessions.remove(id);
        debug!(user_id = ?id, "Session cleared");
        true
    }

    /// Get the number of active sessions
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Check if store is empty
    pub async fn is_empty(&self) -> bool {
        let sessions = self.sessions.read().await;
        sessions.is_empty()
    }
}

/// Session store keyed by Telegram user
pub type TelegramSessionStore = SessionStore<UserId>;
