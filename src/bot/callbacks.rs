//! Inline button handlers: navigation, download and restart

use super::actions::{
    apply_action, run_download, upload_and_discard, ActionOutcome, AudioSink, DownloadOutcome,
};
use super::downloads::{DownloadTicket, TelegramDownloadSlots};
use super::handlers::{send_track, thumbnail_url};
use super::resilient::{
    delete_message_quiet, edit_message_safe_resilient, is_benign_edit_error,
    send_audio_smart, send_message_resilient,
};
use super::views::{track_caption, track_keyboard, BotView, CallbackAction, DefaultBotView};
use crate::providers::{AudioDownloader, DownloadedAudio, Track};
use crate::session::{Session, TelegramSessionStore};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InputFile, InputMedia, InputMediaPhoto, MaybeInaccessibleMessage, MessageId,
    ParseMode, UserId,
};
use tracing::{debug, error, info, warn};

/// Handle an inline keyboard press on a result message.
///
/// # Errors
///
/// Returns an error if Telegram API calls fail.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<TelegramSessionStore>,
    downloader: Arc<dyn AudioDownloader>,
    slots: Arc<TelegramDownloadSlots>,
) -> Result<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        debug!(data = ?q.data, "Ignoring unknown callback");
        return Ok(());
    };
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };

    let user_id = q.from.id;
    let chat_id = message.chat().id;

    match apply_action(&store, &user_id, action).await {
        ActionOutcome::Render(session) => {
            debug!(user_id = ?user_id, index = session.index(), "Navigating results");
            render_in_place(&bot, message, &session).await?;
        }
        ActionOutcome::Unchanged => {}
        ActionOutcome::Download(track) => {
            let Some(ticket) = slots.try_begin(user_id) else {
                send_message_resilient(&bot, chat_id, DefaultBotView::download_in_progress(), None)
                    .await?;
                return Ok(());
            };
            info!(user_id = ?user_id, video_id = %track.video_id, "Download requested");
            tokio::spawn(deliver_track(bot.clone(), chat_id, track, downloader, ticket));
        }
        ActionOutcome::Restarted => {
            remove_keyboard(&bot, chat_id, message.id()).await;
            send_message_resilient(&bot, chat_id, DefaultBotView::prompt_new_query(), None)
                .await?;
        }
        ActionOutcome::Expired => {
            debug!(
                user_id = ?user_id,
                search = %action.session_id(),
                "Press on an expired result message"
            );
            remove_keyboard(&bot, chat_id, message.id()).await;
            send_message_resilient(&bot, chat_id, DefaultBotView::session_expired(), None)
                .await?;
        }
    }

    Ok(())
}

async fn remove_keyboard(bot: &Bot, chat_id: ChatId, message_id: MessageId) {
    if let Err(e) = bot.edit_message_reply_markup(chat_id, message_id).await {
        debug!(error = %e, "Failed to remove keyboard");
    }
}

/// How a result message is brought to a new track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderPlan {
    /// Text message: edit the text
    EditText,
    /// Photo message and the track has a cover: swap photo and caption
    ReplaceMedia,
    /// Photo message but no cover to show: send a fresh message
    Resend,
}

impl RenderPlan {
    const fn choose(shows_photo: bool, has_thumbnail: bool) -> Self {
        match (shows_photo, has_thumbnail) {
            (false, _) => Self::EditText,
            (true, true) => Self::ReplaceMedia,
            (true, false) => Self::Resend,
        }
    }
}

/// Replace the content of a result message with the session's current track.
async fn render_in_place(
    bot: &Bot,
    message: &MaybeInaccessibleMessage,
    session: &Session,
) -> Result<()> {
    let chat_id = message.chat().id;
    let Some(regular) = message.regular_message() else {
        // Too old to edit
        return send_track(bot, chat_id, session).await;
    };
    let message_id = regular.id;
    let thumbnail = thumbnail_url(session);

    match RenderPlan::choose(regular.photo().is_some(), thumbnail.is_some()) {
        RenderPlan::EditText => {
            let result = bot
                .edit_message_text(chat_id, message_id, track_caption(session))
                .parse_mode(ParseMode::Html)
                .reply_markup(track_keyboard(session))
                .await;
            tolerate_edit(result.map(|_| ()))
        }
        RenderPlan::Resend => {
            // A caption edit would leave the previous cover on screen
            delete_message_quiet(bot, chat_id, message_id).await;
            send_track(bot, chat_id, session).await
        }
        RenderPlan::ReplaceMedia => {
            if let Some(url) = thumbnail {
                let media = InputMediaPhoto::new(InputFile::url(url))
                    .caption(track_caption(session))
                    .parse_mode(ParseMode::Html);
                match bot
                    .edit_message_media(chat_id, message_id, InputMedia::Photo(media))
                    .reply_markup(track_keyboard(session))
                    .await
                {
                    Ok(_) => return Ok(()),
                    Err(e) if is_benign_edit_error(&e.to_string()) => return Ok(()),
                    Err(e) => {
                        warn!(error = %e, "Failed to replace thumbnail; editing caption only");
                    }
                }
            }
            edit_caption(bot, chat_id, message_id, session).await
        }
    }
}

async fn edit_caption(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    session: &Session,
) -> Result<()> {
    let result = bot
        .edit_message_caption(chat_id, message_id)
        .caption(track_caption(session))
        .parse_mode(ParseMode::Html)
        .reply_markup(track_keyboard(session))
        .await;
    tolerate_edit(result.map(|_| ()))
}

fn tolerate_edit(result: Result<(), teloxide::RequestError>) -> Result<()> {
    match result {
        Err(e) if is_benign_edit_error(&e.to_string()) => {
            debug!("Message update skipped: {e}");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

/// Uploads finished files into one chat
struct TelegramAudioSink {
    bot: Bot,
    chat_id: ChatId,
}

#[async_trait]
impl AudioSink for TelegramAudioSink {
    async fn upload(&self, audio: &DownloadedAudio) -> Result<()> {
        send_audio_smart(&self.bot, self.chat_id, audio).await?;
        Ok(())
    }
}

/// Download `track`, upload it, and remove the local file.
///
/// Runs detached from the dispatcher so the user can keep browsing. The
/// ticket keeps the user's slot until delivery ends.
async fn deliver_track(
    bot: Bot,
    chat_id: ChatId,
    track: Track,
    downloader: Arc<dyn AudioDownloader>,
    ticket: DownloadTicket<UserId>,
) {
    let status = match send_message_resilient(
        &bot,
        chat_id,
        DefaultBotView::downloading(&track.title),
        None,
    )
    .await
    {
        Ok(msg) => Some(msg.id),
        Err(e) => {
            warn!(error = %e, "Failed to send download status");
            None
        }
    };

    let Some(_permit) = ticket.wait_turn().await else {
        error!(video_id = %track.video_id, "Download limiter closed");
        return;
    };

    let text = match run_download::<DefaultBotView>(downloader.as_ref(), &track).await {
        DownloadOutcome::Ready(audio) => {
            if let Some(status_id) = status {
                edit_message_safe_resilient(&bot, chat_id, status_id, DefaultBotView::uploading())
                    .await;
            }

            let sink = TelegramAudioSink {
                bot: bot.clone(),
                chat_id,
            };
            match upload_and_discard(&sink, &audio).await {
                Ok(()) => {
                    info!(video_id = %track.video_id, size_bytes = audio.size_bytes, "Track delivered");
                    if let Some(status_id) = status {
                        delete_message_quiet(&bot, chat_id, status_id).await;
                    }
                    return;
                }
                Err(e) => {
                    error!(video_id = %track.video_id, error = %e, "Upload failed");
                    DefaultBotView::upload_failed().to_string()
                }
            }
        }
        DownloadOutcome::Failed(text) => text,
    };

    report(&bot, chat_id, status, &text).await;
}

/// Show a failure on the status message, or as a new message without one
async fn report(bot: &Bot, chat_id: ChatId, status: Option<MessageId>, text: &str) {
    if let Some(status_id) = status {
        if edit_message_safe_resilient(bot, chat_id, status_id, text).await {
            return;
        }
    }
    if let Err(e) = send_message_resilient(bot, chat_id, text, None).await {
        error!(error = %e, "Failed to report download failure");
    }
}
