//! Transport collaborator traits.
//!
//! The inline core never talks to Telegram directly. Everything it needs from
//! the platform goes through [`UnitTransport`], [`Interaction`] and
//! [`AccessPolicy`], so the edit protocol can be driven by mocks in tests and
//! by [`crate::bot`] in production.

use crate::inline::SecurityFlags;
use async_trait::async_trait;
use std::time::Duration;
use teloxide::types::{ChatId, InlineKeyboardMarkup, InputMedia, MessageId};
use thiserror::Error;

/// Failures reported by the messaging platform
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The callback query is too old or its id is invalid
    #[error("Invalid query id")]
    InvalidQuery,
    /// The edit would not change the message
    #[error("Message is not modified")]
    MessageNotModified,
    /// The message no longer exists
    #[error("Message id is invalid")]
    MessageIdInvalid,
    /// Flood control: the call may be retried after the given duration
    #[error("Flood control exceeded, retry after {0:?}")]
    RetryAfter(Duration),
    /// Any other platform or network error
    #[error("Transport error: {0}")]
    Other(String),
}

/// Messaging-platform client used by the edit protocol and unit lifecycle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UnitTransport: Send + Sync {
    /// Replace the text (and keyboard) of an inline message
    async fn edit_message_text(
        &self,
        inline_message_id: &str,
        text: &str,
        reply_markup: Option<InlineKeyboardMarkup>,
        disable_web_page_preview: bool,
    ) -> Result<(), TransportError>;

    /// Replace the media (and keyboard) of an inline message
    async fn edit_message_media(
        &self,
        inline_message_id: &str,
        media: InputMedia,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError>;

    /// Delete messages from a chat
    async fn delete_messages(
        &self,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    ) -> Result<(), TransportError>;
}

/// An inbound user interaction (callback query) that triggered an operation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Inline message id the interaction originated from, if any
    fn inline_message_id(&self) -> Option<String>;

    /// Acknowledge the interaction, optionally showing `text` to the user
    async fn answer(&self, text: Option<String>) -> Result<(), TransportError>;
}

/// External security engine deciding whether a caller may run a handler
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Returns `true` if `caller_id` may invoke `handler` under `flags`.
    ///
    /// `flags` is `None` when no default could be resolved; policies should
    /// apply their strictest default in that case.
    async fn authorize(&self, handler: &str, flags: Option<SecurityFlags>, caller_id: i64)
        -> bool;
}
