//! Telegram adapter (teloxide).
//!
//! This crate implements the `paperboy-core` MessagingPort and FileFetcher over
//! the Telegram Bot API, and converts teloxide messages into the core's view.

use async_trait::async_trait;

use teloxide::{
    net::Download,
    requests::Requester as _,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

pub mod handlers;
pub mod router;

use paperboy_core::{
    domain::{ChatId, MessageId, MessageRef, Requester, UserId},
    errors::Error,
    media::{
        DocumentAttachment, FileFetcher, FileRef, IncomingMessage, PhotoVariant,
        StickerAttachment, StickerFormat,
    },
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
            max_message_len: 4096,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_message(Self::tg_chat(chat_id), text.to_string())
            .await
            .map_err(map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn reply_inline_keyboard(
        &self,
        reply_to: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();

        let msg = self
            .bot
            .send_message(Self::tg_chat(reply_to.chat_id), text.to_string())
            .reply_to_message_id(Self::tg_msg_id(reply_to.message_id))
            .reply_markup(InlineKeyboardMarkup::new(rows))
            .await
            .map_err(map_err)?;

        Ok(MessageRef {
            chat_id: reply_to.chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(t) = text {
            req = req.text(t.to_string());
        }
        req.await.map_err(map_err)?;
        Ok(())
    }
}

/// Downloads attachments through `getFile`.
#[derive(Clone)]
pub struct TelegramFileFetcher {
    bot: Bot,
}

impl TelegramFileFetcher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl FileFetcher for TelegramFileFetcher {
    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>> {
        let remote = self
            .bot
            .get_file(file.file_id.clone())
            .await
            .map_err(map_err)?;

        let mut buf = Vec::with_capacity(remote.meta.size as usize);
        self.bot
            .download_file(&remote.path, &mut buf)
            .await
            .map_err(|e| Error::External(format!("telegram download failed: {e}")))?;
        Ok(buf)
    }
}

pub(crate) fn requester_of(user: &teloxide::types::User) -> Requester {
    Requester {
        id: UserId(user.id.0 as i64),
        username: user.username.clone(),
    }
}

pub(crate) fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

fn file_ref(meta: &teloxide::types::FileMeta) -> FileRef {
    FileRef {
        file_id: meta.id.clone(),
        size: u64::from(meta.size),
    }
}

/// Attachments of `msg` and of the messages it replies to.
///
/// Telegram only nests one level of `reply_to_message`, so the chain is short.
pub fn incoming_message(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        document: msg.document().map(|d| DocumentAttachment {
            file: file_ref(&d.file),
            file_name: d.file_name.clone(),
            mime_type: d.mime_type.as_ref().map(|m| m.to_string()),
        }),
        photo: msg
            .photo()
            .map(|sizes| {
                sizes
                    .iter()
                    .map(|p| PhotoVariant {
                        file: file_ref(&p.file),
                        width: p.width,
                        height: p.height,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        sticker: msg.sticker().map(|s| StickerAttachment {
            file: file_ref(&s.file),
            format: match s.format {
                teloxide::types::StickerFormat::Raster => StickerFormat::Raster,
                teloxide::types::StickerFormat::Animated => StickerFormat::Animated,
                teloxide::types::StickerFormat::Video => StickerFormat::Video,
            },
        }),
        reply_to: msg
            .reply_to_message()
            .map(|parent| Box::new(incoming_message(parent))),
    }
}
