//! Default security flags for callback registrations.
//!
//! Entry points that render units pass their flags down explicitly through a
//! [`RenderContext`]. Code that predates the context can still get a default
//! from the entry-point chain: commands and inline handlers run inside
//! [`enter_entry_point`], and [`SecurityResolver::resolve_caller_defaults`]
//! walks that chain outward to the nearest `*cmd` / `*_inline_handler` frame
//! and reads the flags its module declared.

use bitflags::bitflags;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

bitflags! {
    /// Security flags declared by a command or handler
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SecurityFlags: u32 {
        /// The bot owner
        const OWNER = 1 << 0;
        /// Sudo users
        const SUDO = 1 << 1;
        /// Support users
        const SUPPORT = 1 << 2;
        /// Owner of the current group
        const GROUP_OWNER = 1 << 3;
        /// Admins of the current group
        const GROUP_ADMIN = 1 << 10;
        /// Members of the current group
        const GROUP_MEMBER = 1 << 11;
        /// Private messages
        const PM = 1 << 12;
        /// Anybody
        const EVERYONE = 1 << 13;
    }
}

/// Suffixes identifying entry-point functions
const ENTRY_POINT_SUFFIXES: &[&str] = &["cmd", "_inline_handler"];
/// Suffix identifying handler-owning modules
const MODULE_SUFFIX: &str = "Mod";

tokio::task_local! {
    static ENTRY_CHAIN: Vec<EntryFrame>;
}

/// One entry on the active entry-point chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFrame {
    /// Module owning the function
    pub module: String,
    /// Function name
    pub function: String,
}

/// Run `fut` with `module::function` pushed onto the entry-point chain.
pub async fn enter_entry_point<F>(module: &str, function: &str, fut: F) -> F::Output
where
    F: Future,
{
    let mut chain = ENTRY_CHAIN.try_with(Clone::clone).unwrap_or_default();
    chain.push(EntryFrame {
        module: module.to_string(),
        function: function.to_string(),
    });
    ENTRY_CHAIN.scope(chain, fut).await
}

/// Snapshot of the current entry-point chain, outermost first
#[must_use]
pub fn current_chain() -> Vec<EntryFrame> {
    ENTRY_CHAIN.try_with(Clone::clone).unwrap_or_default()
}

fn is_entry_point(function: &str) -> bool {
    ENTRY_POINT_SUFFIXES
        .iter()
        .any(|suffix| function.ends_with(suffix))
}

/// Rendering context carried from the entry point down to the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    /// Flags of the entry point that produced the unit
    pub security: Option<SecurityFlags>,
    /// Unit being rendered
    pub unit_uid: Option<String>,
}

impl RenderContext {
    /// Context with explicit security flags
    #[must_use]
    pub fn with_security(flags: SecurityFlags) -> Self {
        Self {
            security: Some(flags),
            unit_uid: None,
        }
    }

    /// Context for rendering a specific unit
    #[must_use]
    pub fn for_unit(uid: impl Into<String>) -> Self {
        Self {
            security: None,
            unit_uid: Some(uid.into()),
        }
    }

    /// Attach the unit uid
    #[must_use]
    pub fn unit(mut self, uid: impl Into<String>) -> Self {
        self.unit_uid = Some(uid.into());
        self
    }
}

/// Resolves default security flags for new callback registrations
#[derive(Default)]
pub struct SecurityResolver {
    modules: RwLock<HashMap<String, HashMap<String, SecurityFlags>>>,
}

impl SecurityResolver {
    /// Create a resolver with no known modules
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the flags of a module's entry points
    pub fn register_module<I, S>(&self, module: impl Into<String>, handlers: I)
    where
        I: IntoIterator<Item = (S, SecurityFlags)>,
        S: Into<String>,
    {
        let handlers = handlers
            .into_iter()
            .map(|(name, flags)| (name.into(), flags))
            .collect();
        self.modules.write().insert(module.into(), handlers);
    }

    /// Flags for a render: the explicit context first, the entry chain second
    #[must_use]
    pub fn resolve(&self, ctx: &RenderContext) -> Option<SecurityFlags> {
        ctx.security.or_else(|| self.resolve_caller_defaults())
    }

    /// Flags declared for the nearest entry point on the current chain.
    ///
    /// Returns `None` when there is no chain, no entry point on it, or the
    /// entry point's module is unknown; callers should then apply the
    /// strictest default.
    #[must_use]
    pub fn resolve_caller_defaults(&self) -> Option<SecurityFlags> {
        let Ok(chain) = ENTRY_CHAIN.try_with(Clone::clone) else {
            debug!("No entry-point chain, can't resolve security flags");
            return None;
        };

        let Some(frame) = chain
            .iter()
            .rev()
            .find(|frame| is_entry_point(&frame.function))
        else {
            debug!(depth = chain.len(), "No entry point found on chain");
            return None;
        };

        debug!(module = %frame.module, function = %frame.function, "Found caller");

        if !frame.module.ends_with(MODULE_SUFFIX) {
            debug!(module = %frame.module, "Caller module is not a handler module");
            return None;
        }

        let flags = self
            .modules
            .read()
            .get(&frame.module)
            .and_then(|handlers| handlers.get(&frame.function))
            .copied();

        if flags.is_none() {
            debug!(module = %frame.module, function = %frame.function, "No declared flags for caller");
        }
        flags
    }
}
