use crate::{
    domain::{MessageRef, Requester},
    pending::{callback_data, RequestId},
};

/// Inline keyboard (buttons) offering the printers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// One button per row, option `idx` bound to `request_id`.
    pub fn one_per_row(request_id: &RequestId, options: &[String], max_label_len: usize) -> Self {
        let buttons = options
            .iter()
            .enumerate()
            .map(|(idx, opt)| InlineButton {
                label: truncate_label(opt, max_label_len),
                callback_data: callback_data(request_id, idx),
            })
            .collect();
        Self { buttons }
    }
}

fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    format!("{}...", label.chars().take(max_chars).collect::<String>())
}

/// A button press on a printer menu.
#[derive(Clone, Debug)]
pub struct SelectionCallback {
    pub callback_id: String,
    pub clicker: Requester,
    pub data: String,
    /// The menu message, if the platform still has it.
    pub message: Option<MessageRef>,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    /// Longest text the platform accepts, in chars.
    pub max_message_len: usize,
}

/// Clip `text` so it fits in one message of `max_len` chars.
pub fn fit_message(text: &str, max_len: usize) -> String {
    const MARK: &str = "\n…";
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(MARK.chars().count());
    let mut out = text.chars().take(keep).collect::<String>();
    out.push_str(MARK);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_button_per_option_in_order() {
        let id = RequestId("r1".to_string());
        let kb = InlineKeyboard::one_per_row(
            &id,
            &["😶 Apathy, Room A".to_string(), "Joy, Room B".to_string()],
            48,
        );
        assert_eq!(kb.buttons.len(), 2);
        assert_eq!(kb.buttons[0].label, "😶 Apathy, Room A");
        assert_eq!(kb.buttons[0].callback_data, "print:r1:0");
        assert_eq!(kb.buttons[1].callback_data, "print:r1:1");
    }

    #[test]
    fn long_messages_are_clipped_to_the_limit() {
        let text = "Available printers:\n• ".repeat(10);
        let clipped = fit_message(&text, 30);
        assert_eq!(clipped.chars().count(), 30);
        assert!(clipped.ends_with("\n…"));
        assert_eq!(fit_message("short", 30), "short");
    }

    #[test]
    fn long_labels_are_truncated_on_char_boundaries() {
        let label = truncate_label("ÄÖÜäöü long printer", 4);
        assert_eq!(label, "ÄÖÜä...");
    }
}
