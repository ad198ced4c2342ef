//! Callback registry
//!
//! Maps correlation tokens minted by the markup compiler to their handlers
//! and security overrides.

use super::security::SecurityFlags;
use super::types::{ButtonMatrix, CallbackButton};
use crate::transport::Interaction;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Invocation of a callback handler by the dispatcher
pub struct CallbackCall {
    /// Token of the pressed button
    pub token: String,
    /// User who pressed the button
    pub caller_id: i64,
    /// Unit the button belongs to, if known
    pub unit_uid: Option<String>,
    /// The originating interaction
    pub interaction: Arc<dyn Interaction>,
    /// Registered positional arguments
    pub args: Vec<Value>,
    /// Registered keyword arguments
    pub kwargs: Map<String, Value>,
}

/// Handler bound to callback buttons
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// Handler name, used by the security policy
    fn name(&self) -> &str;

    /// Run the handler
    async fn handle(&self, call: CallbackCall) -> anyhow::Result<()>;
}

impl fmt::Debug for dyn CallbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("name", &self.name())
            .finish()
    }
}

/// What the dispatcher needs to run a pressed callback button
#[derive(Debug, Clone)]
pub struct CallbackRegistration {
    /// Handler to invoke
    pub handler: Arc<dyn CallbackHandler>,
    /// Callers allowed regardless of the policy
    pub always_allow: Vec<i64>,
    /// Positional handler arguments
    pub args: Vec<Value>,
    /// Keyword handler arguments
    pub kwargs: Map<String, Value>,
    /// Only the owner may invoke
    pub force_me: bool,
    /// Skip the policy
    pub disable_security: bool,
    /// Default flags of the entry point that rendered the button
    pub default_flags: Option<SecurityFlags>,
    /// Unit the button was rendered for
    pub unit_uid: Option<String>,
}

impl CallbackRegistration {
    /// Build a registration from a compiled callback button
    #[must_use]
    pub fn from_button(
        button: &CallbackButton,
        default_flags: Option<SecurityFlags>,
        unit_uid: Option<String>,
    ) -> Self {
        Self {
            handler: Arc::clone(&button.handler),
            always_allow: button.always_allow.clone(),
            args: button.args.clone(),
            kwargs: button.kwargs.clone(),
            force_me: button.force_me,
            disable_security: button.disable_security,
            default_flags,
            unit_uid,
        }
    }
}

/// Token → registration map
#[derive(Default)]
pub struct CallbackRegistry {
    entries: RwLock<HashMap<String, CallbackRegistration>>,
}

impl CallbackRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token, replacing any previous registration for it
    pub fn register(&self, token: impl Into<String>, registration: CallbackRegistration) {
        self.entries.write().insert(token.into(), registration);
    }

    /// Look up the registration for a token
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<CallbackRegistration> {
        self.entries.read().get(token).cloned()
    }

    /// Check if a token is registered
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.entries.read().contains_key(token)
    }

    /// Remove a single token
    pub fn unregister(&self, token: &str) -> Option<CallbackRegistration> {
        self.entries.write().remove(token)
    }

    /// Drop every registration minted for `matrix`
    pub fn forget_matrix(&self, matrix: &ButtonMatrix) -> usize {
        let mut entries = self.entries.write();
        let removed = matrix
            .callback_tokens()
            .filter(|token| entries.remove(*token).is_some())
            .count();
        if removed > 0 {
            debug!(removed, "Forgot callback registrations");
        }
        removed
    }

    /// Drop every registration bound to unit `uid`, including tokens of
    /// keyboards the unit no longer shows
    pub fn forget_unit(&self, uid: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, registration| registration.unit_uid.as_deref() != Some(uid));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(uid, removed, "Forgot unit callback registrations");
        }
        removed
    }

    /// Number of registered tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no token is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
