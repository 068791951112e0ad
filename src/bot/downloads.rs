//! Admission control for background downloads
//!
//! Each user may have one download in flight, and a shared semaphore caps how
//! many yt-dlp processes run at once. Created once by the runner and handed to
//! the button handler as a dispatcher dependency.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use teloxide::types::UserId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Slots keyed by Telegram user id
pub type TelegramDownloadSlots = DownloadSlots<UserId>;

/// Per-user and global download limits
#[derive(Debug)]
pub struct DownloadSlots<Id> {
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<Id>>,
}

impl<Id> DownloadSlots<Id>
where
    Id: Hash + Eq + Clone + Debug,
{
    /// Allow up to `max_concurrent` downloads at once (at least one)
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve the user's slot; `None` while their previous download runs
    #[must_use]
    pub fn try_begin(self: &Arc<Self>, user: Id) -> Option<DownloadTicket<Id>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(user.clone()) {
            debug!(user_id = ?user, "Download already in flight");
            return None;
        }
        Some(DownloadTicket {
            slots: Arc::clone(self),
            user,
        })
    }
}

/// A reserved per-user slot, released on drop
#[derive(Debug)]
pub struct DownloadTicket<Id>
where
    Id: Hash + Eq + Clone + Debug,
{
    slots: Arc<DownloadSlots<Id>>,
    user: Id,
}

impl<Id> DownloadTicket<Id>
where
    Id: Hash + Eq + Clone + Debug,
{
    /// Wait for a global download permit
    pub async fn wait_turn(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slots.permits).acquire_owned().await.ok()
    }
}

impl<Id> Drop for DownloadTicket<Id>
where
    Id: Hash + Eq + Clone + Debug,
{
    fn drop(&mut self) {
        self.slots
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user);
    }
}
