//! Configuration and settings management
//!
//! Loads inline unit settings from config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Default length of callback correlation tokens.
pub const CALLBACK_TOKEN_LEN: usize = 30;
/// Default length of switch-query tokens for input buttons.
pub const SWITCH_QUERY_LEN: usize = 10;
/// Accepted callback token lengths; Telegram caps `callback_data` at 64 bytes.
pub const CALLBACK_TOKEN_LEN_RANGE: RangeInclusive<usize> = 8..=64;
/// Accepted switch-query token lengths.
pub const SWITCH_QUERY_LEN_RANGE: RangeInclusive<usize> = 4..=64;
/// Notice sent to the interaction when the message it should edit is gone.
pub const DELETED_MESSAGE_NOTICE: &str = "I should have edited some message, but it is deleted :(";

/// Inline unit settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct InlineSettings {
    /// Length of tokens minted for callback buttons
    #[serde(default = "default_callback_token_len")]
    pub callback_token_len: usize,

    /// Length of tokens minted for input buttons
    #[serde(default = "default_switch_query_len")]
    pub switch_query_len: usize,

    /// Maximum number of flood-wait retries per edit; unbounded when unset
    #[serde(default)]
    pub floodwait_max_retries: Option<u32>,

    /// Telegram ID of the unit owner, required by `force_me` buttons
    #[serde(default)]
    pub owner_id: Option<i64>,

    /// Text answered to an interaction whose message was deleted
    #[serde(default = "default_deleted_message_notice")]
    pub deleted_message_notice: String,

    /// Default web-page preview preference for text edits
    #[serde(default = "default_disable_web_page_preview")]
    pub disable_web_page_preview: bool,
}

const fn default_callback_token_len() -> usize {
    CALLBACK_TOKEN_LEN
}

const fn default_switch_query_len() -> usize {
    SWITCH_QUERY_LEN
}

fn default_deleted_message_notice() -> String {
    DELETED_MESSAGE_NOTICE.to_string()
}

const fn default_disable_web_page_preview() -> bool {
    true
}

impl Default for InlineSettings {
    fn default() -> Self {
        Self {
            callback_token_len: CALLBACK_TOKEN_LEN,
            switch_query_len: SWITCH_QUERY_LEN,
            floodwait_max_retries: None,
            owner_id: None,
            deleted_message_notice: default_deleted_message_notice(),
            disable_web_page_preview: true,
        }
    }
}

/// Build the layered configuration source used by [`InlineSettings::new`].
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `INLINE__FLOODWAIT_MAX_RETRIES=5` sets `floodwait_max_retries`
        .add_source(Environment::with_prefix("INLINE").separator("__"))
        .build()
}

impl InlineSettings {
    /// Create new settings by loading from files and environment.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use inline_units::config::InlineSettings;
    ///
    /// let settings = InlineSettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a token length is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check token lengths against [`CALLBACK_TOKEN_LEN_RANGE`] and
    /// [`SWITCH_QUERY_LEN_RANGE`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !CALLBACK_TOKEN_LEN_RANGE.contains(&self.callback_token_len) {
            return Err(ConfigError::Message(format!(
                "callback_token_len must be within {CALLBACK_TOKEN_LEN_RANGE:?}, got {}",
                self.callback_token_len
            )));
        }
        if !SWITCH_QUERY_LEN_RANGE.contains(&self.switch_query_len) {
            return Err(ConfigError::Message(format!(
                "switch_query_len must be within {SWITCH_QUERY_LEN_RANGE:?}, got {}",
                self.switch_query_len
            )));
        }
        Ok(())
    }

    /// Returns `true` if another flood-wait retry is allowed after `retries` retries.
    #[must_use]
    pub fn allows_floodwait_retry(&self, retries: u32) -> bool {
        self.floodwait_max_retries.is_none_or(|max| retries < max)
    }
}
