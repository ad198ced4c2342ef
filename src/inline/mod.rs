//! Inline units: registries, markup compiler and edit protocol.
//!
//! [`InlineManager`] is the owned context every operation goes through. It
//! holds the [`CallbackRegistry`], the [`UnitStore`], the
//! [`SecurityResolver`] and the transport collaborators; nothing here lives
//! in module-level state.

mod dispatch;
mod edit;
mod lifecycle;
/// Markup compiler
pub mod markup;
/// Callback registry and handler trait
pub mod registry;
/// Security flags and default resolution
pub mod security;
/// Button and unit data model
pub mod types;
/// Unit store
pub mod units;

pub use dispatch::FORBIDDEN_NOTICE;
pub use edit::{EditOutcome, EditRequest, FileSource};
pub use markup::{CompiledKeyboard, MarkupCompiler, MarkupSource};
pub use registry::{CallbackCall, CallbackHandler, CallbackRegistration, CallbackRegistry};
pub use security::{enter_entry_point, EntryFrame, RenderContext, SecurityFlags, SecurityResolver};
pub use types::{
    Button, ButtonKind, ButtonMatrix, CallbackButton, RawButton, TeardownHook, Unit, UnitPatch,
};
pub use units::UnitStore;

use crate::config::InlineSettings;
use crate::transport::{AccessPolicy, TransportError, UnitTransport};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by inline unit operations
#[derive(Debug, Error)]
pub enum InlineError {
    /// A raw button sets more than one kind
    #[error("Button kinds are mutually exclusive, got: {0}")]
    AmbiguousButton(String),
    /// A raw button has no label
    #[error("Button has no text")]
    MissingText,
    /// No unused callback token could be minted at this length
    #[error("No free callback token of length {token_len}")]
    TokenSpaceExhausted {
        /// Configured token length
        token_len: usize,
    },
    /// No unit with this uid
    #[error("Unit not found: {0}")]
    UnitNotFound(String),
    /// More than one media parameter was passed to an edit
    #[error("You passed two or more exclusive parameters simultaneously: {0}")]
    ExclusiveMedia(String),
    /// A media or file URL is not valid
    #[error("Invalid URL for `{field}`: {url}")]
    InvalidUrl {
        /// Parameter holding the URL
        field: &'static str,
        /// The rejected value
        url: String,
    },
    /// In-memory file passed without a MIME type
    #[error("You must pass `mime_type` along with an in-memory `file`")]
    MissingMimeType,
    /// Nothing to edit: no inline message id could be resolved
    #[error("Attempted to edit message with no `inline_message_id`")]
    NoInlineMessageId,
    /// The unit has no chat/message pair to delete
    #[error("Unit {0} has no chat/message reference")]
    MissingMessageRef(String),
    /// Flood-wait retries were exhausted
    #[error("Flood wait retries exhausted after {retries} retries (last wait: {last_wait:?})")]
    RateLimited {
        /// Retries performed
        retries: u32,
        /// Last wait requested by the platform
        last_wait: std::time::Duration,
    },
    /// The edit was cancelled while waiting out a flood wait
    #[error("Edit cancelled")]
    Cancelled,
    /// The platform rejected the call
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A unit's teardown hook failed; the unit was removed anyway
    #[error("Teardown hook of unit {uid} failed: {message}")]
    TeardownFailed {
        /// Unit uid
        uid: String,
        /// Hook error
        message: String,
    },
    /// No registration for a callback token
    #[error("No handler registered for token {0}")]
    UnknownToken(String),
    /// The security policy denied the caller
    #[error("User {caller_id} is not allowed to run {handler}")]
    Forbidden {
        /// Handler name
        handler: String,
        /// Caller id
        caller_id: i64,
    },
    /// The callback handler returned an error
    #[error("Handler {handler} failed: {message}")]
    Handler {
        /// Handler name
        handler: String,
        /// Handler error
        message: String,
    },
}

/// Owned context for inline unit operations
pub struct InlineManager {
    settings: InlineSettings,
    registry: Arc<CallbackRegistry>,
    units: Arc<UnitStore>,
    resolver: Arc<SecurityResolver>,
    compiler: MarkupCompiler,
    transport: Arc<dyn UnitTransport>,
    policy: Arc<dyn AccessPolicy>,
}

impl InlineManager {
    /// Create a manager with empty registries
    #[must_use]
    pub fn new(
        transport: Arc<dyn UnitTransport>,
        policy: Arc<dyn AccessPolicy>,
        settings: InlineSettings,
    ) -> Self {
        let registry = Arc::new(CallbackRegistry::new());
        let units = Arc::new(UnitStore::new());
        let resolver = Arc::new(SecurityResolver::new());
        let compiler = MarkupCompiler::new(
            Arc::clone(&registry),
            Arc::clone(&units),
            Arc::clone(&resolver),
            &settings,
        );

        Self {
            settings,
            registry,
            units,
            resolver,
            compiler,
            transport,
            policy,
        }
    }

    /// Active settings
    #[must_use]
    pub const fn settings(&self) -> &InlineSettings {
        &self.settings
    }

    /// Token registry
    #[must_use]
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Unit store
    #[must_use]
    pub fn units(&self) -> &UnitStore {
        &self.units
    }

    /// Security resolver, used to declare module flags for the fallback path
    #[must_use]
    pub fn resolver(&self) -> &SecurityResolver {
        &self.resolver
    }

    /// Compile a button source, registering new callback tokens.
    ///
    /// # Errors
    ///
    /// See [`MarkupCompiler::compile`].
    pub fn compile(
        &self,
        source: impl Into<MarkupSource>,
        ctx: &RenderContext,
    ) -> Result<Option<CompiledKeyboard>, InlineError> {
        self.compiler.compile(source, ctx)
    }
}
