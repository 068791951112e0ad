//! Command and text message handlers

use super::actions::{run_search, SearchOutcome};
use super::resilient::{delete_message_quiet, edit_message_safe_resilient, send_message_resilient};
use super::views::{track_caption, track_keyboard, BotView, DefaultBotView};
use crate::config::Settings;
use crate::providers::MusicSearch;
use crate::session::{Session, TelegramSessionStore};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode, UserId};
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Start the bot and show welcome message
    #[command(description = "Start the bot.")]
    Start,
}

/// Safe extraction of the sender from a message.
/// Returns `None` for messages without a user (channel posts).
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> Option<UserId> {
    msg.from.as_ref().map(|u| u.id)
}

/// Handler for the /start command
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    info!(user_id = ?get_user_id_safe(&msg), "Start command");
    send_message_resilient(&bot, msg.chat.id, DefaultBotView::welcome_message(), None).await?;
    Ok(())
}

/// Treat a text message as a search query and show the first result.
///
/// # Errors
///
/// Returns an error if Telegram API calls fail.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    store: Arc<TelegramSessionStore>,
    search: Arc<dyn MusicSearch>,
    settings: Arc<Settings>,
) -> Result<()> {
    let Some(user_id) = get_user_id_safe(&msg) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let query = msg.text().unwrap_or_default().trim().to_string();

    if query.is_empty() {
        send_message_resilient(&bot, chat_id, DefaultBotView::empty_query(), None).await?;
        return Ok(());
    }

    let status =
        send_message_resilient(&bot, chat_id, DefaultBotView::searching(&query), None).await?;

    let outcome = run_search(
        &store,
        search.as_ref(),
        user_id,
        &query,
        settings.effective_search_limit(),
    )
    .await;

    match outcome {
        SearchOutcome::Results(session) => {
            delete_message_quiet(&bot, chat_id, status.id).await;
            send_track(&bot, chat_id, &session).await?;
        }
        SearchOutcome::NoResults => {
            edit_message_safe_resilient(
                &bot,
                chat_id,
                status.id,
                &DefaultBotView::no_results(&query),
            )
            .await;
        }
        SearchOutcome::EmptyQuery => {
            edit_message_safe_resilient(&bot, chat_id, status.id, DefaultBotView::empty_query())
                .await;
        }
    }

    Ok(())
}

/// Parse a thumbnail reference into a URL Telegram can fetch
pub(crate) fn thumbnail_url(session: &Session) -> Option<url::Url> {
    session
        .current()
        .thumbnail_url
        .as_deref()
        .and_then(|raw| url::Url::parse(raw).ok())
}

/// Send the current track of `session` as a new message.
///
/// Uses a photo with caption when the track has a thumbnail, otherwise (or if
/// Telegram cannot fetch the image) a text message.
///
/// # Errors
///
/// Returns an error if the text message cannot be sent.
pub async fn send_track(bot: &Bot, chat_id: ChatId, session: &Session) -> Result<()> {
    let caption = track_caption(session);
    let keyboard = track_keyboard(session);

    if let Some(url) = thumbnail_url(session) {
        match bot
            .send_photo(chat_id, InputFile::url(url))
            .caption(caption.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => warn!(error = %e, "Failed to send thumbnail; falling back to text"),
        }
    }

    bot.send_message(chat_id, caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}
