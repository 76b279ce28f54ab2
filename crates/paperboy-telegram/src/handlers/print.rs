use std::sync::Arc;

use teloxide::{prelude::*, types::MessageEntityKind};
use tracing::{debug, warn};

use paperboy_core::flow::PrintRequest;

use crate::{incoming_message, message_ref, requester_of, router::AppState};

pub async fn handle_print(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        debug!(chat_id = msg.chat.id.0, "message without sender, ignoring");
        return Ok(());
    };

    let req = PrintRequest {
        message: message_ref(&msg),
        requester: requester_of(user),
        content: incoming_message(&msg),
    };

    if let Err(e) = state.flow.handle_print_request(req, &state.fetcher).await {
        warn!(user_id = user.id.0, error = %e, "print request failed");
    }
    Ok(())
}

/// True when the text or caption mentions `@bot_username`.
pub fn mentions(msg: &Message, bot_username: &str) -> bool {
    let entities = msg.parse_entities().or_else(|| msg.parse_caption_entities());
    let Some(entities) = entities else {
        return false;
    };
    entities.iter().any(|e| {
        matches!(e.kind(), MessageEntityKind::Mention) && is_mention_of(e.text(), bot_username)
    })
}

fn is_mention_of(mention: &str, bot_username: &str) -> bool {
    !bot_username.is_empty()
        && mention
            .strip_prefix('@')
            .is_some_and(|name| name.eq_ignore_ascii_case(bot_username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_matches_bot_username_case_insensitively() {
        assert!(is_mention_of("@PaperBoyBot", "paperboybot"));
        assert!(is_mention_of("@paperboybot", "paperboybot"));
        assert!(!is_mention_of("@someone_else", "paperboybot"));
        assert!(!is_mention_of("paperboybot", "paperboybot"));
        assert!(!is_mention_of("@", ""));
    }
}
