//! Shared test fixtures

use crate::config::InlineSettings;
use crate::inline::{CallbackCall, CallbackHandler, InlineManager};
use crate::transport::{MockAccessPolicy, MockUnitTransport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Handler that counts its invocations
pub struct NamedHandler {
    name: String,
    calls: AtomicUsize,
}

impl NamedHandler {
    /// Concrete handle, for asserting on [`Self::calls`]
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Type-erased handle
    pub fn arc(name: &str) -> Arc<dyn CallbackHandler> {
        Self::new(name)
    }

    /// Times the handler ran
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallbackHandler for NamedHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _call: CallbackCall) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Handler that always fails
pub struct FailingHandler;

#[async_trait]
impl CallbackHandler for FailingHandler {
    fn name(&self) -> &str {
        "failing_cb"
    }

    async fn handle(&self, _call: CallbackCall) -> anyhow::Result<()> {
        anyhow::bail!("handler exploded")
    }
}

/// Manager over a mocked transport and a policy that admits everyone
pub fn manager_with(transport: MockUnitTransport, settings: InlineSettings) -> InlineManager {
    let mut policy = MockAccessPolicy::new();
    policy.expect_authorize().returning(|_, _, _| true);
    manager_with_policy(transport, policy, settings)
}

/// Manager over a mocked transport and policy
pub fn manager_with_policy(
    transport: MockUnitTransport,
    policy: MockAccessPolicy,
    settings: InlineSettings,
) -> InlineManager {
    InlineManager::new(Arc::new(transport), Arc::new(policy), settings)
}
