//! Telegram update handlers.
//!
//! Commands are answered directly; everything else is offered to the print flow
//! when the bot is addressed (private chat, or an `@mention` in a group).

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;

mod callback;
mod commands;
mod print;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
    }

    if msg.chat.is_private() || print::mentions(&msg, &state.bot_username) {
        return print::handle_print(msg, state).await;
    }

    Ok(())
}
