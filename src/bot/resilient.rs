//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Status messages are sent and edited through
//! [`crate::utils::retry_telegram_operation`], which retries transient network
//! failures using exponential backoff with jitter.
//!
//! # Usage
//!
//! ```ignore
//! use ytmusic_dl_bot::bot::resilient::{send_message_resilient, edit_message_safe_resilient};
//!
//! let msg = send_message_resilient(&bot, chat_id, "🔎 Searching…", None).await?;
//! let success = edit_message_safe_resilient(&bot, chat_id, msg.id, "📤 Uploading…").await;
//! ```

use crate::providers::DownloadedAudio;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, Message, MessageId, ParseMode};
use tracing::{debug, warn};

/// Telegram rejects edits that change nothing
const ERROR_NOT_MODIFIED: &str = "message is not modified";
/// The message was deleted in the meantime
const ERROR_NOT_FOUND: &str = "message to edit not found";

/// Longest text sent in one message (Telegram allows 4096)
const MAX_MESSAGE_CHARS: usize = 4000;

/// Whether an edit error means there is simply nothing to do
#[must_use]
pub fn is_benign_edit_error(err_msg: &str) -> bool {
    err_msg.contains(ERROR_NOT_MODIFIED) || err_msg.contains(ERROR_NOT_FOUND)
}

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = crate::utils::truncate_str(text.into(), MAX_MESSAGE_CHARS);
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a plain-text message with automatic retry on network failures.
///
/// # Errors
///
/// Returns the last error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
) -> Result<Message> {
    let text = crate::utils::truncate_str(text.into(), MAX_MESSAGE_CHARS);
    crate::utils::retry_telegram_operation(|| async {
        bot.edit_message_text(chat_id, msg_id, text.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

/// Edit a status message with graceful degradation and automatic retry.
///
/// # Returns
///
/// - `true` if message was successfully edited
/// - `false` if edit was skipped (not modified / not found) or failed after retries
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    match edit_message_resilient(bot, chat_id, msg_id, text).await {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if is_benign_edit_error(&err_msg) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}

/// Delete a message, logging failures instead of returning them.
pub async fn delete_message_quiet(bot: &Bot, chat_id: ChatId, msg_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, msg_id).await {
        debug!(error = %e, "Failed to delete message");
    }
}

/// Upload an MP3 as a native audio attachment.
///
/// Falls back to sending a document if the audio send fails.
///
/// # Errors
///
/// Returns an error if both the audio and the document upload fail.
pub async fn send_audio_smart(
    bot: &Bot,
    chat_id: ChatId,
    audio: &DownloadedAudio,
) -> Result<Message> {
    let make_file = || InputFile::file(audio.path.clone()).file_name(audio.file_name.clone());

    match bot
        .send_audio(chat_id, make_file())
        .title(audio.title.clone())
        .performer(audio.performer.clone())
        .await
    {
        Ok(msg) => Ok(msg),
        Err(e) => {
            warn!(
                file_name = %audio.file_name,
                error = %e,
                "Failed to send audio as native media; falling back to document"
            );
            bot.send_document(chat_id, make_file())
                .await
                .map_err(Into::into)
        }
    }
}
