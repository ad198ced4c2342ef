//! Button and unit data model.

use super::registry::CallbackHandler;
use super::InlineError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId};
use tracing::warn;

/// Hook run when a unit is unloaded
pub type TeardownHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Callback button payload: the handler and its security overrides
#[derive(Debug, Clone)]
pub struct CallbackButton {
    /// Handler invoked when the button is pressed
    pub handler: Arc<dyn CallbackHandler>,
    /// Callers allowed regardless of the security policy
    pub always_allow: Vec<i64>,
    /// Extra positional arguments passed to the handler
    pub args: Vec<Value>,
    /// Extra keyword arguments passed to the handler
    pub kwargs: Map<String, Value>,
    /// Only the unit owner may press the button
    pub force_me: bool,
    /// Skip the security policy entirely
    pub disable_security: bool,
    pub(crate) token: Option<String>,
}

impl CallbackButton {
    /// Create a callback payload with no overrides
    #[must_use]
    pub fn new(handler: Arc<dyn CallbackHandler>) -> Self {
        Self {
            handler,
            always_allow: Vec::new(),
            args: Vec::new(),
            kwargs: Map::new(),
            force_me: false,
            disable_security: false,
            token: None,
        }
    }

    /// Allow these callers regardless of the security policy
    #[must_use]
    pub fn always_allow(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.always_allow = ids.into_iter().collect();
        self
    }

    /// Set positional handler arguments
    #[must_use]
    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set keyword handler arguments
    #[must_use]
    pub fn kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Restrict the button to the unit owner
    #[must_use]
    pub const fn force_me(mut self) -> Self {
        self.force_me = true;
        self
    }

    /// Bypass the security policy
    #[must_use]
    pub const fn disable_security(mut self) -> Self {
        self.disable_security = true;
        self
    }

    /// Token minted for this button, once compiled
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// What a button does when pressed. Exactly one kind per button.
#[derive(Debug, Clone)]
pub enum ButtonKind {
    /// Static link
    Url(String),
    /// Registered handler
    Callback(CallbackButton),
    /// Switch to an inline query in the current chat, seeded with a minted token
    Input {
        /// Prompt shown to the user
        prompt: String,
        /// Switch-query token, minted at compile time
        token: Option<String>,
    },
    /// Caller-supplied callback data, not registered
    Data(String),
    /// Literal switch-query text.
    ///
    /// With `current_chat: false` Telegram opens its chat picker. A raw
    /// `switch_inline_query` button maps to that variant and no longer stays
    /// in the current chat; use `switch_inline_query_current_chat` for that.
    SwitchQuery {
        /// Query inserted into the input field
        query: String,
        /// Query the current chat instead of opening a chat picker
        current_chat: bool,
    },
}

/// One visual control of a unit's keyboard
#[derive(Debug, Clone)]
pub struct Button {
    /// Button label
    pub text: String,
    /// Button kind
    pub kind: ButtonKind,
}

impl Button {
    /// Create a button of an arbitrary kind
    pub fn new(text: impl Into<String>, kind: ButtonKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    /// Link button
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(text, ButtonKind::Url(url.into()))
    }

    /// Callback button without overrides
    pub fn callback(text: impl Into<String>, handler: Arc<dyn CallbackHandler>) -> Self {
        Self::new(text, ButtonKind::Callback(CallbackButton::new(handler)))
    }

    /// Callback button with a configured payload
    pub fn callback_with(text: impl Into<String>, callback: CallbackButton) -> Self {
        Self::new(text, ButtonKind::Callback(callback))
    }

    /// Input button
    pub fn input(text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(
            text,
            ButtonKind::Input {
                prompt: prompt.into(),
                token: None,
            },
        )
    }

    /// Raw callback-data button
    pub fn data(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(text, ButtonKind::Data(data.into()))
    }

    /// Switch-inline-query button
    pub fn switch_query(text: impl Into<String>, query: impl Into<String>, current_chat: bool) -> Self {
        Self::new(
            text,
            ButtonKind::SwitchQuery {
                query: query.into(),
                current_chat,
            },
        )
    }

    /// Minted token of a callback or input button
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match &self.kind {
            ButtonKind::Callback(callback) => callback.token(),
            ButtonKind::Input { token, .. } => token.as_deref(),
            _ => None,
        }
    }
}

/// Declarative button form with every kind optional.
///
/// Converted into a [`Button`] before compilation; ambiguity and missing
/// labels are rejected at that point.
#[derive(Debug, Clone, Default)]
pub struct RawButton {
    /// Button label
    pub text: Option<String>,
    /// Link target
    pub url: Option<String>,
    /// Callback handler
    pub callback: Option<Arc<dyn CallbackHandler>>,
    /// Input prompt
    pub input: Option<String>,
    /// Raw callback data
    pub data: Option<String>,
    /// Switch query opening a chat picker
    pub switch_inline_query: Option<String>,
    /// Switch query for the current chat
    pub switch_inline_query_current_chat: Option<String>,
    /// Callback override, see [`CallbackButton::always_allow`]
    pub always_allow: Vec<i64>,
    /// Callback arguments
    pub args: Vec<Value>,
    /// Callback keyword arguments
    pub kwargs: Map<String, Value>,
    /// Callback override, see [`CallbackButton::force_me`]
    pub force_me: bool,
    /// Callback override, see [`CallbackButton::disable_security`]
    pub disable_security: bool,
}

impl RawButton {
    /// Convert into a typed button.
    ///
    /// Returns `Ok(None)` for a button with no recognized kind; such buttons
    /// are dropped from the keyboard.
    ///
    /// # Errors
    ///
    /// Returns [`InlineError::AmbiguousButton`] when more than one kind is
    /// set and [`InlineError::MissingText`] when the label is missing.
    pub fn into_button(self) -> Result<Option<Button>, InlineError> {
        let kinds: Vec<&'static str> = [
            ("url", self.url.is_some()),
            ("callback", self.callback.is_some()),
            ("input", self.input.is_some()),
            ("data", self.data.is_some()),
            ("switch_inline_query", self.switch_inline_query.is_some()),
            (
                "switch_inline_query_current_chat",
                self.switch_inline_query_current_chat.is_some(),
            ),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect();

        if kinds.len() > 1 {
            return Err(InlineError::AmbiguousButton(kinds.join(", ")));
        }

        let Some(text) = self.text else {
            return Err(InlineError::MissingText);
        };

        let kind = if let Some(url) = self.url {
            ButtonKind::Url(url)
        } else if let Some(handler) = self.callback {
            ButtonKind::Callback(CallbackButton {
                handler,
                always_allow: self.always_allow,
                args: self.args,
                kwargs: self.kwargs,
                force_me: self.force_me,
                disable_security: self.disable_security,
                token: None,
            })
        } else if let Some(prompt) = self.input {
            ButtonKind::Input {
                prompt,
                token: None,
            }
        } else if let Some(data) = self.data {
            ButtonKind::Data(data)
        } else if let Some(query) = self.switch_inline_query_current_chat {
            ButtonKind::SwitchQuery {
                query,
                current_chat: true,
            }
        } else if let Some(query) = self.switch_inline_query {
            ButtonKind::SwitchQuery {
                query,
                current_chat: false,
            }
        } else {
            warn!(text = %text, "Button has no recognized kind, dropping it");
            return Ok(None);
        };

        Ok(Some(Button { text, kind }))
    }
}

/// Ordered rows of buttons; order determines on-screen layout
#[derive(Debug, Clone, Default)]
pub struct ButtonMatrix {
    rows: Vec<Vec<Button>>,
}

impl ButtonMatrix {
    /// Wrap already-nested rows
    #[must_use]
    pub const fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Validate declarative rows.
    ///
    /// Every button is checked so that all structural problems get logged,
    /// then the first one is returned.
    ///
    /// # Errors
    ///
    /// Returns the first structural error found.
    pub fn from_raw(rows: Vec<Vec<RawButton>>) -> Result<Self, InlineError> {
        let mut first_error = None;
        let mut matrix = Vec::with_capacity(rows.len());

        for row in rows {
            let mut line = Vec::with_capacity(row.len());
            for raw in row {
                match raw.into_button() {
                    Ok(Some(button)) => line.push(button),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Malformed button in markup");
                        first_error.get_or_insert(e);
                    }
                }
            }
            matrix.push(line);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Self::new(matrix)),
        }
    }

    /// Rows in display order
    #[must_use]
    pub fn rows(&self) -> &[Vec<Button>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Button>] {
        &mut self.rows
    }

    /// Iterate over every button, row by row
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }

    /// Returns `true` if the matrix holds no buttons at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// Callback tokens minted for this matrix
    pub fn callback_tokens(&self) -> impl Iterator<Item = &str> {
        self.buttons().filter_map(|button| match &button.kind {
            ButtonKind::Callback(callback) => callback.token(),
            _ => None,
        })
    }
}

impl From<Button> for ButtonMatrix {
    fn from(button: Button) -> Self {
        Self::new(vec![vec![button]])
    }
}

impl From<Vec<Button>> for ButtonMatrix {
    fn from(row: Vec<Button>) -> Self {
        Self::new(vec![row])
    }
}

impl From<Vec<Vec<Button>>> for ButtonMatrix {
    fn from(rows: Vec<Vec<Button>>) -> Self {
        Self::new(rows)
    }
}

/// A tracked, editable message with an attached keyboard
#[derive(Clone, Default)]
pub struct Unit {
    /// Unit identifier
    pub uid: String,
    /// Chat the message lives in
    pub chat_id: Option<ChatId>,
    /// Message identifier inside `chat_id`
    pub message_id: Option<MessageId>,
    /// Inline message identifier, authoritative for edits when present
    pub inline_message_id: Option<String>,
    /// Buttons as last compiled
    pub buttons: ButtonMatrix,
    /// Only the owner may press this unit's buttons
    pub force_me: bool,
    /// Skip the security policy for this unit's buttons
    pub disable_security: bool,
    /// Callers allowed regardless of the security policy
    pub always_allow: Vec<i64>,
    /// Hook run when the unit is unloaded
    pub on_unload: Option<TeardownHook>,
}

impl Unit {
    /// Create a unit bound to a sent message
    pub fn new(uid: impl Into<String>, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            uid: uid.into(),
            chat_id: Some(chat_id),
            message_id: Some(message_id),
            ..Self::default()
        }
    }

    /// Create a unit with no message reference yet
    pub fn detached(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Self::default()
        }
    }

    /// Set the inline message id
    #[must_use]
    pub fn with_inline_message_id(mut self, id: impl Into<String>) -> Self {
        self.inline_message_id = Some(id.into());
        self
    }

    /// Set the button matrix
    #[must_use]
    pub fn with_buttons(mut self, buttons: impl Into<ButtonMatrix>) -> Self {
        self.buttons = buttons.into();
        self
    }

    /// Set the teardown hook
    #[must_use]
    pub fn with_on_unload<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_unload = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("uid", &self.uid)
            .field("chat_id", &self.chat_id)
            .field("message_id", &self.message_id)
            .field("inline_message_id", &self.inline_message_id)
            .field("buttons", &self.buttons)
            .field("force_me", &self.force_me)
            .field("disable_security", &self.disable_security)
            .field("always_allow", &self.always_allow)
            .field("on_unload", &self.on_unload.is_some())
            .finish()
    }
}

/// Partial unit update; only fields set to `Some` are applied
#[derive(Debug, Clone, Default)]
pub struct UnitPatch {
    /// Replacement button matrix
    pub buttons: Option<ButtonMatrix>,
    /// New `force_me` value
    pub force_me: Option<bool>,
    /// New `disable_security` value
    pub disable_security: Option<bool>,
    /// New `always_allow` list
    pub always_allow: Option<Vec<i64>>,
}

impl UnitPatch {
    /// Returns `true` if the patch changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buttons.is_none()
            && self.force_me.is_none()
            && self.disable_security.is_none()
            && self.always_allow.is_none()
    }

    /// Merge the patch into `unit`
    pub fn apply(self, unit: &mut Unit) {
        if let Some(buttons) = self.buttons {
            unit.buttons = buttons;
        }
        if let Some(force_me) = self.force_me {
            unit.force_me = force_me;
        }
        if let Some(disable_security) = self.disable_security {
            unit.disable_security = disable_security;
        }
        if let Some(always_allow) = self.always_allow {
            unit.always_allow = always_allow;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NamedHandler;

    fn raw(text: &str) -> RawButton {
        RawButton {
            text: Some(text.to_string()),
            ..RawButton::default()
        }
    }

    #[test]
    fn test_raw_button_kinds() {
        let button = RawButton {
            url: Some("https://example.com".into()),
            ..raw("Link")
        };
        assert!(matches!(
            button.into_button(),
            Ok(Some(Button { kind: ButtonKind::Url(_), .. }))
        ));

        let button = RawButton {
            switch_inline_query: Some("hello".into()),
            ..raw("Share")
        };
        assert!(matches!(
            button.into_button(),
            Ok(Some(Button {
                kind: ButtonKind::SwitchQuery { current_chat: false, .. },
                ..
            }))
        ));

        let button = RawButton {
            callback: Some(NamedHandler::arc("ping_inline_handler")),
            force_me: true,
            args: vec![Value::from(1)],
            ..raw("Ping")
        };
        let Ok(Some(Button { kind: ButtonKind::Callback(callback), .. })) = button.into_button()
        else {
            panic!("expected a callback button");
        };
        assert!(callback.force_me);
        assert_eq!(callback.args, vec![Value::from(1)]);
        assert!(callback.token().is_none());
    }

    #[test]
    fn test_raw_button_ambiguous_kind() {
        let button = RawButton {
            url: Some("https://example.com".into()),
            callback: Some(NamedHandler::arc("cb")),
            ..raw("Both")
        };
        let err = button.into_button().err();
        assert!(matches!(err, Some(InlineError::AmbiguousButton(kinds)) if kinds == "url, callback"));
    }

    #[test]
    fn test_raw_button_without_text_or_kind() {
        let no_text = RawButton {
            data: Some("x".into()),
            ..RawButton::default()
        };
        assert!(matches!(no_text.into_button(), Err(InlineError::MissingText)));

        assert!(matches!(raw("Nothing").into_button(), Ok(None)));
    }

    #[test]
    fn test_from_raw_reports_failure_after_other_rows() {
        let rows = vec![
            vec![RawButton {
                data: Some("ok".into()),
                ..raw("Fine")
            }],
            vec![RawButton {
                url: Some("https://example.com".into()),
                callback: Some(NamedHandler::arc("cb")),
                ..raw("Broken")
            }],
        ];
        assert!(matches!(
            ButtonMatrix::from_raw(rows),
            Err(InlineError::AmbiguousButton(_))
        ));
    }

    #[test]
    fn test_matrix_shapes() {
        let single: ButtonMatrix = Button::data("A", "a").into();
        assert_eq!(single.rows().len(), 1);
        assert_eq!(single.rows()[0].len(), 1);

        let row: ButtonMatrix = vec![Button::data("A", "a"), Button::data("B", "b")].into();
        assert_eq!(row.rows().len(), 1);
        assert_eq!(row.rows()[0].len(), 2);

        let nested: ButtonMatrix = vec![
            vec![Button::data("A", "a")],
            vec![Button::data("B", "b"), Button::data("C", "c")],
        ]
        .into();
        let labels: Vec<&str> = nested.buttons().map(|b| b.text.as_str()).collect();
        assert_eq!(labels, ["A", "B", "C"]);

        assert!(ButtonMatrix::new(vec![vec![]]).is_empty());
        assert!(ButtonMatrix::default().is_empty());
    }

    #[test]
    fn test_patch_merges_only_supplied_fields() {
        let mut unit = Unit::new("uid", ChatId(1), MessageId(2));
        unit.force_me = true;
        unit.always_allow = vec![5];

        UnitPatch {
            disable_security: Some(true),
            ..UnitPatch::default()
        }
        .apply(&mut unit);

        assert!(unit.force_me);
        assert!(unit.disable_security);
        assert_eq!(unit.always_allow, vec![5]);

        UnitPatch {
            force_me: Some(false),
            always_allow: Some(vec![]),
            ..UnitPatch::default()
        }
        .apply(&mut unit);
        assert!(!unit.force_me);
        assert!(unit.always_allow.is_empty());
    }
}
