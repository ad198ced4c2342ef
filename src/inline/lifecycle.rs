//! Unit lifecycle: unload and delete

use super::{InlineError, InlineManager};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

impl InlineManager {
    /// Unload a unit: remove it from the store, forget its callback tokens
    /// and run its teardown hook.
    ///
    /// # Errors
    ///
    /// Returns [`InlineError::UnitNotFound`] if no unit with `uid` exists, and
    /// [`InlineError::TeardownFailed`] if the teardown hook fails or panics.
    /// The unit is removed and its tokens forgotten regardless of the hook.
    pub fn unload_unit(&self, uid: &str) -> Result<(), InlineError> {
        let Some(unit) = self.units.remove(uid) else {
            debug!(uid, "Unload of unknown unit");
            return Err(InlineError::UnitNotFound(uid.to_string()));
        };

        let forgotten =
            self.registry.forget_matrix(&unit.buttons) + self.registry.forget_unit(uid);
        debug!(uid, forgotten, "Unit unloaded");

        let Some(hook) = unit.on_unload else {
            return Ok(());
        };

        let message = match panic::catch_unwind(AssertUnwindSafe(|| hook())) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "teardown hook panicked".to_string()),
        };

        warn!(uid, error = %message, "Teardown hook failed");
        Err(InlineError::TeardownFailed {
            uid: uid.to_string(),
            message,
        })
    }

    /// Delete a unit's message and unload the unit.
    ///
    /// # Errors
    ///
    /// Returns [`InlineError::UnitNotFound`] for an unknown uid,
    /// [`InlineError::MissingMessageRef`] when the unit has no chat/message
    /// pair, [`InlineError::Transport`] when the platform rejects the delete
    /// (the unit is kept), and any error from [`Self::unload_unit`].
    pub async fn delete_unit(&self, uid: &str) -> Result<(), InlineError> {
        let unit = self
            .units
            .get(uid)
            .ok_or_else(|| InlineError::UnitNotFound(uid.to_string()))?;

        let (Some(chat_id), Some(message_id)) = (unit.chat_id, unit.message_id) else {
            error!(uid, "Can't delete unit without chat/message reference");
            return Err(InlineError::MissingMessageRef(uid.to_string()));
        };

        self.transport
            .delete_messages(chat_id, vec![message_id])
            .await
            .inspect_err(|e| {
                error!(uid, error = %e, "Failed to delete unit message");
            })?;

        info!(uid, chat_id = chat_id.0, "Unit message deleted");
        self.unload_unit(uid)?;
        Ok(())
    }
}
