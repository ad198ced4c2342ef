//! Default [`AccessPolicy`] built on fixed user lists

use crate::inline::SecurityFlags;
use crate::transport::AccessPolicy;
use async_trait::async_trait;
use tracing::debug;

/// Grants access by the owner / sudo / support flags.
///
/// Group flags need chat membership data and are never granted here. Without
/// declared flags only the owner passes.
#[derive(Debug, Clone, Default)]
pub struct FlagPolicy {
    owner_id: Option<i64>,
    sudo: Vec<i64>,
    support: Vec<i64>,
}

impl FlagPolicy {
    /// Policy for a bot owned by `owner_id`
    #[must_use]
    pub const fn new(owner_id: Option<i64>) -> Self {
        Self {
            owner_id,
            sudo: Vec::new(),
            support: Vec::new(),
        }
    }

    /// Users matched by [`SecurityFlags::SUDO`]
    #[must_use]
    pub fn with_sudo(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.sudo.extend(ids);
        self
    }

    /// Users matched by [`SecurityFlags::SUPPORT`]
    #[must_use]
    pub fn with_support(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.support.extend(ids);
        self
    }

    fn is_owner(&self, caller_id: i64) -> bool {
        self.owner_id == Some(caller_id)
    }
}

#[async_trait]
impl AccessPolicy for FlagPolicy {
    async fn authorize(&self, handler: &str, flags: Option<SecurityFlags>, caller_id: i64) -> bool {
        let granted = self.is_owner(caller_id)
            || flags.is_some_and(|flags| {
                flags.contains(SecurityFlags::EVERYONE)
                    || (flags.contains(SecurityFlags::SUDO) && self.sudo.contains(&caller_id))
                    || (flags.contains(SecurityFlags::SUPPORT) && self.support.contains(&caller_id))
            });
        debug!(handler, caller_id, ?flags, granted, "Policy decision");
        granted
    }
}
