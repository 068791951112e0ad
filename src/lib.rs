#![deny(missing_docs)]
//! YouTube Music download bot for Telegram.
//!
//! Search a song by name, browse the results with inline buttons and
//! receive the selected track as an MP3.

/// Telegram handlers, views and dispatcher wiring.
pub mod bot;
/// Configuration management.
pub mod config;
/// Log output redaction.
pub mod logging;
/// Search and download adapters.
pub mod providers;
/// Telegram runtime entrypoint.
pub mod runner;
/// Per-user browsing sessions.
pub mod session;
/// Utility functions.
pub mod utils;
