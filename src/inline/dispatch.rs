//! Callback dispatch
//!
//! Resolves a pressed button's token, checks the caller against the
//! registration and unit overrides, then runs the handler.

use super::registry::{CallbackCall, CallbackRegistration};
use super::{InlineError, InlineManager};
use crate::transport::Interaction;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shown to callers the security policy rejects
pub const FORBIDDEN_NOTICE: &str = "You are not allowed to press this button!";

/// Outcome of the security checks for one press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Open,
    Allowlisted,
    Owner,
    Policy(bool),
}

impl Access {
    const fn granted(self) -> bool {
        match self {
            Self::Open | Self::Allowlisted | Self::Owner => true,
            Self::Policy(granted) => granted,
        }
    }
}

impl InlineManager {
    /// Merge unit-level overrides into a registration
    fn effective_registration(&self, mut registration: CallbackRegistration) -> CallbackRegistration {
        let Some(unit) = registration
            .unit_uid
            .as_deref()
            .and_then(|uid| self.units.get(uid))
        else {
            return registration;
        };

        registration.force_me |= unit.force_me;
        registration.disable_security |= unit.disable_security;
        for id in unit.always_allow {
            if !registration.always_allow.contains(&id) {
                registration.always_allow.push(id);
            }
        }
        registration
    }

    async fn check_access(&self, registration: &CallbackRegistration, caller_id: i64) -> Access {
        if registration.disable_security {
            return Access::Open;
        }
        if registration.always_allow.contains(&caller_id) {
            return Access::Allowlisted;
        }
        if registration.force_me {
            return if self.settings.owner_id == Some(caller_id) {
                Access::Owner
            } else {
                Access::Policy(false)
            };
        }
        Access::Policy(
            self.policy
                .authorize(
                    registration.handler.name(),
                    registration.default_flags,
                    caller_id,
                )
                .await,
        )
    }

    /// Route a button press to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`InlineError::UnknownToken`] when nothing is registered for
    /// `token`, [`InlineError::Forbidden`] when the caller fails the security
    /// checks, and [`InlineError::Handler`] when the handler returns an error.
    pub async fn dispatch_callback(
        &self,
        token: &str,
        caller_id: i64,
        interaction: Arc<dyn Interaction>,
    ) -> Result<(), InlineError> {
        let Some(registration) = self.registry.resolve(token) else {
            debug!(token, "Press on unknown token");
            return Err(InlineError::UnknownToken(token.to_string()));
        };
        let registration = self.effective_registration(registration);
        let handler = registration.handler.name().to_string();

        let access = self.check_access(&registration, caller_id).await;
        if !access.granted() {
            warn!(handler = %handler, caller_id, "Callback press denied");
            if let Err(e) = interaction.answer(Some(FORBIDDEN_NOTICE.to_string())).await {
                debug!(error = %e, "Failed to answer denied press");
            }
            return Err(InlineError::Forbidden { handler, caller_id });
        }
        debug!(handler = %handler, caller_id, ?access, "Dispatching callback");

        let call = CallbackCall {
            token: token.to_string(),
            caller_id,
            unit_uid: registration.unit_uid,
            interaction,
            args: registration.args,
            kwargs: registration.kwargs,
        };

        registration.handler.handle(call).await.map_err(|e| {
            error!(handler = %handler, error = %e, "Callback handler failed");
            InlineError::Handler {
                handler,
                message: format!("{e:#}"),
            }
        })
    }
}
