//! `UnitTransport` over a teloxide [`Bot`]

use crate::transport::{TransportError, UnitTransport};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, InputMedia, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::debug;

impl From<RequestError> for TransportError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::RetryAfter(secs) => Self::RetryAfter(secs.duration()),
            RequestError::Api(ApiError::MessageNotModified) => Self::MessageNotModified,
            RequestError::Api(
                ApiError::MessageIdInvalid
                | ApiError::MessageToEditNotFound
                | ApiError::MessageToDeleteNotFound,
            ) => Self::MessageIdInvalid,
            RequestError::Api(ApiError::InvalidQueryId) => Self::InvalidQuery,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Telegram transport for inline units.
///
/// Text edits are sent with HTML parse mode.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl UnitTransport for TelegramTransport {
    async fn edit_message_text(
        &self,
        inline_message_id: &str,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
        disable_web_page_preview: bool,
    ) -> Result<(), TransportError> {
        let mut req = self
            .bot
            .edit_message_text_inline(inline_message_id, text)
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(disable_web_page_preview);
        if let Some(markup) = reply_markup {
            req = req.reply_markup(markup);
        }
        req.await.map(|_| ()).map_err(Into::into)
    }

    async fn edit_message_media(
        &self,
        inline_message_id: &str,
        media: InputMedia,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        let mut req = self.bot.edit_message_media_inline(inline_message_id, media);
        if let Some(markup) = reply_markup {
            req = req.reply_markup(markup);
        }
        req.await.map(|_| ()).map_err(Into::into)
    }

    async fn delete_messages(
        &self,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    ) -> Result<(), TransportError> {
        debug!(chat_id = chat_id.0, count = message_ids.len(), "Deleting messages");
        self.bot
            .delete_messages(chat_id, message_ids)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }
}
