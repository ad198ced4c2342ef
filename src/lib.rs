#![deny(missing_docs)]
//! Inline units for Telegram bots.
//!
//! An inline unit is a message with an attached button grid that is edited
//! in place as users tap its buttons. This crate compiles button matrices into
//! keyboards, keeps the token and unit registries, and implements the
//! edit/delete protocol with flood-wait recovery.

/// Telegram (teloxide) implementations of the transport traits.
pub mod bot;
/// Configuration management.
pub mod config;
/// Unit registries, markup compiler and edit protocol.
pub mod inline;
/// Transport collaborator traits and their error type.
pub mod transport;
/// Utility functions.
pub mod utils;

/// Test fixtures.
#[cfg(test)]
pub mod testing;

pub use config::InlineSettings;
pub use inline::{
    Button, ButtonKind, ButtonMatrix, CallbackButton, CallbackCall, CallbackHandler,
    CallbackRegistration, CallbackRegistry, CompiledKeyboard, EditOutcome, EditRequest,
    InlineError, InlineManager, MarkupSource, RawButton, RenderContext, SecurityFlags,
    SecurityResolver, Unit, UnitPatch, UnitStore,
};
pub use transport::{AccessPolicy, Interaction, TransportError, UnitTransport};
