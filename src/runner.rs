use crate::bot;
use crate::bot::downloads::TelegramDownloadSlots;
use crate::bot::handlers::Command;
use crate::config::Settings;
use crate::providers::{AudioDownloader, MusicSearch, YtDlpDownloader, YtMusicSearch};
use crate::session::TelegramSessionStore;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

/// Run the Telegram long-polling loop until Ctrl-C.
pub async fn run_bot(settings: Arc<Settings>) {
    let downloader = init_downloader(&settings).await;
    let search: Arc<dyn MusicSearch> = Arc::new(YtMusicSearch::new());
    let store = Arc::new(TelegramSessionStore::new());
    let slots = Arc::new(TelegramDownloadSlots::new(
        settings.effective_max_concurrent_downloads(),
    ));

    let bot = Bot::new(settings.telegram_bot_token.clone());
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let handler = setup_handler();

    info!(
        search_limit = settings.effective_search_limit(),
        mirrors = settings.invidious_instances().len(),
        max_concurrent_downloads = settings.effective_max_concurrent_downloads(),
        "Bot is running..."
    );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, store, search, downloader, slots])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn init_downloader(settings: &Settings) -> Arc<dyn AudioDownloader> {
    let downloader = YtDlpDownloader::from_settings(settings);
    match downloader.ensure_downloads_dir().await {
        Ok(()) => {
            match downloader.sweep_downloads_dir().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Removed files left by unfinished downloads"),
                Err(e) => warn!("Failed to sweep downloads directory: {e}"),
            }
            info!(dir = ?downloader.downloads_dir(), "Downloads directory ready.");
            Arc::new(downloader)
        }
        Err(e) => {
            error!(
                "Failed to create downloads directory {:?}: {}",
                downloader.downloads_dir(),
                e
            );
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_button))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some())
                        .endpoint(handle_search_text),
                ),
        )
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_search_text(
    bot: Bot,
    msg: Message,
    store: Arc<TelegramSessionStore>,
    search: Arc<dyn MusicSearch>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_text(bot, msg, store, search, settings).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_button(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<TelegramSessionStore>,
    downloader: Arc<dyn AudioDownloader>,
    slots: Arc<TelegramDownloadSlots>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::callbacks::handle_callback(bot, q, store, downloader, slots).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}
