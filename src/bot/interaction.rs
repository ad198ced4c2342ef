//! Callback-query side of inline units: the [`Interaction`] wrapper and the
//! dispatcher endpoint routing button presses to [`InlineManager`].

use crate::inline::{InlineError, InlineManager};
use crate::transport::{Interaction, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, warn};

/// A callback query pressed on an inline unit
pub struct TelegramInteraction {
    bot: Bot,
    query: CallbackQuery,
}

impl TelegramInteraction {
    /// Wrap a callback query
    pub const fn new(bot: Bot, query: CallbackQuery) -> Self {
        Self { bot, query }
    }
}

#[async_trait]
impl Interaction for TelegramInteraction {
    fn inline_message_id(&self) -> Option<String> {
        self.query.inline_message_id.clone()
    }

    async fn answer(&self, text: Option<String>) -> Result<(), TransportError> {
        let mut req = self.bot.answer_callback_query(self.query.id.clone());
        if let Some(text) = text {
            req = req.text(text);
        }
        req.await.map(|_| ()).map_err(Into::into)
    }
}

/// Route an inline button press to its registered handler.
///
/// Failures are logged; the dispatcher never sees them.
///
/// # Errors
///
/// Never returns an error; the signature fits [`UpdateHandler`].
pub async fn handle_inline_callback(
    bot: Bot,
    q: CallbackQuery,
    manager: Arc<InlineManager>,
) -> anyhow::Result<()> {
    let Some(token) = q.data.clone() else {
        return Ok(());
    };
    let caller_id = q.from.id.0.cast_signed();
    let interaction: Arc<dyn Interaction> = Arc::new(TelegramInteraction::new(bot, q));

    route_press(&manager, &token, caller_id, interaction).await;
    Ok(())
}

/// Dispatch a press and acknowledge it when nobody else did.
///
/// Denied presses are answered by the dispatcher; unknown tokens and failed
/// handlers get an empty answer so the client stops waiting.
pub async fn route_press(
    manager: &InlineManager,
    token: &str,
    caller_id: i64,
    interaction: Arc<dyn Interaction>,
) {
    let result = manager
        .dispatch_callback(token, caller_id, Arc::clone(&interaction))
        .await;

    match result {
        Ok(()) | Err(InlineError::Forbidden { .. }) => return,
        Err(InlineError::UnknownToken(token)) => {
            debug!(token = %token, "Press on expired or foreign button");
        }
        Err(e) => warn!(caller_id, error = %e, "Inline callback failed"),
    }

    if let Err(e) = interaction.answer(None).await {
        debug!(error = %e, "Failed to answer inline callback");
    }
}

/// Dispatcher branch for inline unit callbacks.
///
/// Needs an `Arc<InlineManager>` among the dispatcher dependencies.
#[must_use]
pub fn callback_schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_callback_query().endpoint(handle_inline_callback)
}
