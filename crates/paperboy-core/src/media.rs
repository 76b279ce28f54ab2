//! Printable media and the policy for finding it in a chat message.
//!
//! The messenger adapter converts its native message into [`IncomingMessage`]
//! (including the replied-to chain) and supplies a [`FileFetcher`] for downloads.

use async_trait::async_trait;
use tracing::debug;

use crate::{errors::PrintError, Result};

pub const PHOTO_NAME: &str = "photo.jpg";
pub const PHOTO_MIME: &str = "image/jpeg";
pub const STICKER_NAME: &str = "sticker.webp";
pub const STICKER_MIME: &str = "image/webp";
pub const DOCUMENT_NAME: &str = "document";

/// A fully downloaded attachment, ready to be spooled.
#[derive(Clone, PartialEq, Eq)]
pub struct Media {
    pub data: Vec<u8>,
    pub name: String,
    pub mime_type: String,
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Media")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Remote file handle plus its advertised size (0 when unknown).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub file_id: String,
    pub size: u64,
}

#[derive(Clone, Debug)]
pub struct DocumentAttachment {
    pub file: FileRef,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PhotoVariant {
    pub file: FileRef,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StickerFormat {
    Raster,
    Animated,
    Video,
}

#[derive(Clone, Debug)]
pub struct StickerAttachment {
    pub file: FileRef,
    pub format: StickerFormat,
}

/// Messenger-agnostic view of an incoming message's attachments.
#[derive(Clone, Debug, Default)]
pub struct IncomingMessage {
    pub document: Option<DocumentAttachment>,
    pub photo: Vec<PhotoVariant>,
    pub sticker: Option<StickerAttachment>,
    pub reply_to: Option<Box<IncomingMessage>>,
}

/// Downloads attachment bytes from the chat platform.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>>;
}

#[derive(Clone, Copy, Debug)]
pub struct ExtractLimits {
    pub max_bytes: u64,
    /// How many replied-to messages may be followed.
    pub max_depth: usize,
}

/// The attachment chosen for printing, before download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedAttachment<'a> {
    pub file: &'a FileRef,
    pub name: String,
    pub mime_type: String,
}

/// Pick the attachment to print from `msg`, following at most `max_depth` replies.
pub fn select_attachment(
    msg: &IncomingMessage,
    max_depth: usize,
) -> Option<SelectedAttachment<'_>> {
    let mut current = msg;
    let mut depth = 0usize;
    loop {
        if let Some(found) = select_direct(current) {
            return Some(found);
        }
        let parent = current.reply_to.as_deref()?;
        if depth >= max_depth {
            debug!(max_depth, "reply chain too deep, giving up");
            return None;
        }
        depth += 1;
        current = parent;
    }
}

fn select_direct(msg: &IncomingMessage) -> Option<SelectedAttachment<'_>> {
    if let Some(doc) = &msg.document {
        if let Some(mime) = doc.mime_type.as_deref().filter(|m| !m.trim().is_empty()) {
            return Some(SelectedAttachment {
                file: &doc.file,
                name: doc
                    .file_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DOCUMENT_NAME.to_string()),
                mime_type: mime.to_string(),
            });
        }
    }

    // Later entries win ties: Telegram lists sizes smallest first.
    if let Some(best) = msg
        .photo
        .iter()
        .enumerate()
        .max_by_key(|(idx, p)| (u64::from(p.width) * u64::from(p.height), *idx))
        .map(|(_, p)| p)
    {
        return Some(SelectedAttachment {
            file: &best.file,
            name: PHOTO_NAME.to_string(),
            mime_type: PHOTO_MIME.to_string(),
        });
    }

    if let Some(sticker) = &msg.sticker {
        if sticker.format == StickerFormat::Raster {
            return Some(SelectedAttachment {
                file: &sticker.file,
                name: STICKER_NAME.to_string(),
                mime_type: STICKER_MIME.to_string(),
            });
        }
    }

    None
}

/// Find and download the printable media in `msg`.
///
/// `Ok(None)` means nothing printable was found; callers ignore the message.
pub async fn extract_media(
    msg: &IncomingMessage,
    fetcher: &dyn FileFetcher,
    limits: ExtractLimits,
) -> std::result::Result<Option<Media>, PrintError> {
    let Some(selected) = select_attachment(msg, limits.max_depth) else {
        return Ok(None);
    };

    if selected.file.size > limits.max_bytes {
        return Err(PrintError::MediaTooLarge {
            size: selected.file.size,
            limit: limits.max_bytes,
        });
    }

    let data = fetcher
        .fetch(selected.file)
        .await
        .map_err(|e| PrintError::MediaDownloadFailed(e.to_string()))?;

    let size = data.len() as u64;
    if size > limits.max_bytes {
        return Err(PrintError::MediaTooLarge {
            size,
            limit: limits.max_bytes,
        });
    }

    Ok(Some(Media {
        data,
        name: selected.name,
        mime_type: selected.mime_type,
    }))
}
