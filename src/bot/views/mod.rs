//! Message texts, captions and keyboards

pub mod track;

pub use track::{
    track_caption, track_keyboard, BotView, CallbackAction, DefaultBotView, CALLBACK_DOWNLOAD,
    CALLBACK_NEXT, CALLBACK_PREV, CALLBACK_RESTART,
};
