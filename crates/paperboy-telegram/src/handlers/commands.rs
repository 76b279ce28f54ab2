use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, warn};

use paperboy_core::domain::ChatId;

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// `/cmd@other_bot` in a group is meant for someone else.
fn addressed_to_other_bot(text: &str, bot_username: &str) -> bool {
    let first = text.trim().split(char::is_whitespace).next().unwrap_or("");
    match first.split_once('@') {
        Some((_, target)) => !target.eq_ignore_ascii_case(bot_username),
        None => false,
    }
}

fn help_text(bot_username: &str) -> String {
    format!(
        "🖨 Paperboy prints what you send me.\n\n\
Send a document, photo or sticker in a private chat, or mention @{bot_username} \
in a group (also as a reply to a message with an attachment). \
Then pick a printer from the list.\n\n\
Commands:\n\
/start - Show this help message\n\
/help - Show this help message\n\
/printers - List available printers"
    )
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if addressed_to_other_bot(text, &state.bot_username) {
        return Ok(());
    }

    let chat_id = ChatId(msg.chat.id.0);
    let (cmd, _arg) = parse_command(text);

    let reply = match cmd.as_str() {
        "start" | "help" => help_text(&state.bot_username),
        "printers" => state.flow.printers_text().await,
        other => {
            debug!(command = other, "unknown command");
            return Ok(());
        }
    };

    if let Err(e) = state.flow.messenger().send_text(chat_id, &reply).await {
        warn!(command = %cmd, error = %e, "failed to answer command");
    }
    Ok(())
}
