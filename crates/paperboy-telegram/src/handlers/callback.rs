use std::sync::Arc;

use teloxide::prelude::*;
use tracing::warn;

use paperboy_core::messaging::types::SelectionCallback;

use crate::{message_ref, requester_of, router::AppState};

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Always answer callback query eventually.
    let Some(data) = q.data.clone().filter(|d| !d.is_empty()) else {
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };

    let cb = SelectionCallback {
        callback_id: q.id.clone(),
        clicker: requester_of(&q.from),
        data,
        message: q.message.as_ref().map(message_ref),
    };

    if let Err(e) = state.flow.handle_selection(cb).await {
        warn!(user_id = q.from.id.0, error = %e, "printer selection failed");
    }
    Ok(())
}
