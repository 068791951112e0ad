/// Session, search and download flow shared by the handlers
pub mod actions;
/// Inline button handlers
pub mod callbacks;
/// Per-user and global download limits
pub mod downloads;
/// Command and text message handlers
pub mod handlers;
/// Telegram API calls with retry and graceful degradation
pub mod resilient;
/// Texts, captions and keyboards
pub mod views;
