//! Markup compiler
//!
//! Turns button matrices into teloxide inline keyboards, minting correlation
//! tokens for callback and input buttons and registering callback tokens.

use super::registry::{CallbackRegistration, CallbackRegistry};
use super::security::{RenderContext, SecurityFlags, SecurityResolver};
use super::types::{Button, ButtonKind, ButtonMatrix, RawButton};
use super::units::UnitStore;
use super::InlineError;
use crate::config::InlineSettings;
use crate::utils::{parse_url, rand_token};
use std::sync::Arc;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{debug, warn};

/// Fresh tokens tried per callback button before giving up
const MAX_MINT_ATTEMPTS: usize = 16;

/// Where the buttons to compile come from
#[derive(Debug, Clone)]
pub enum MarkupSource {
    /// The current buttons of a stored unit
    Stored(String),
    /// A typed button matrix
    Matrix(ButtonMatrix),
    /// Declarative rows, validated before compiling
    Raw(Vec<Vec<RawButton>>),
}

impl MarkupSource {
    /// Reference the stored buttons of unit `uid`
    pub fn stored(uid: impl Into<String>) -> Self {
        Self::Stored(uid.into())
    }
}

impl From<ButtonMatrix> for MarkupSource {
    fn from(matrix: ButtonMatrix) -> Self {
        Self::Matrix(matrix)
    }
}

impl From<Button> for MarkupSource {
    fn from(button: Button) -> Self {
        Self::Matrix(button.into())
    }
}

impl From<Vec<Button>> for MarkupSource {
    fn from(row: Vec<Button>) -> Self {
        Self::Matrix(row.into())
    }
}

impl From<Vec<Vec<Button>>> for MarkupSource {
    fn from(rows: Vec<Vec<Button>>) -> Self {
        Self::Matrix(rows.into())
    }
}

impl From<RawButton> for MarkupSource {
    fn from(button: RawButton) -> Self {
        Self::Raw(vec![vec![button]])
    }
}

impl From<Vec<RawButton>> for MarkupSource {
    fn from(row: Vec<RawButton>) -> Self {
        Self::Raw(vec![row])
    }
}

impl From<Vec<Vec<RawButton>>> for MarkupSource {
    fn from(rows: Vec<Vec<RawButton>>) -> Self {
        Self::Raw(rows)
    }
}

/// Result of a successful compile
#[derive(Debug, Clone)]
pub struct CompiledKeyboard {
    /// Transport-ready keyboard
    pub markup: InlineKeyboardMarkup,
    /// The matrix with every token assigned
    pub matrix: ButtonMatrix,
    /// Callback tokens minted by this compile
    pub minted: Vec<String>,
}

/// Compiles button matrices and registers their callback tokens
pub struct MarkupCompiler {
    registry: Arc<CallbackRegistry>,
    units: Arc<UnitStore>,
    resolver: Arc<SecurityResolver>,
    callback_token_len: usize,
    switch_query_len: usize,
}

impl MarkupCompiler {
    /// Create a compiler writing into `registry`
    #[must_use]
    pub fn new(
        registry: Arc<CallbackRegistry>,
        units: Arc<UnitStore>,
        resolver: Arc<SecurityResolver>,
        settings: &InlineSettings,
    ) -> Self {
        Self {
            registry,
            units,
            resolver,
            callback_token_len: settings.callback_token_len,
            switch_query_len: settings.switch_query_len,
        }
    }

    /// Compile `source` into a keyboard.
    ///
    /// Returns `Ok(None)` when there is nothing to render. Buttons with an
    /// invalid URL are dropped with a warning. Compiling a matrix whose
    /// buttons already carry tokens registers nothing new.
    ///
    /// # Errors
    ///
    /// Returns a structural error from [`ButtonMatrix::from_raw`] for raw
    /// sources, [`InlineError::UnitNotFound`] for a stored source whose
    /// unit does not exist, or [`InlineError::TokenSpaceExhausted`] when no
    /// unused callback token can be minted. Nothing stays registered on error.
    pub fn compile(
        &self,
        source: impl Into<MarkupSource>,
        ctx: &RenderContext,
    ) -> Result<Option<CompiledKeyboard>, InlineError> {
        let (mut matrix, stored_uid) = match source.into() {
            MarkupSource::Stored(uid) => {
                let unit = self
                    .units
                    .get(&uid)
                    .ok_or_else(|| InlineError::UnitNotFound(uid.clone()))?;
                (unit.buttons, Some(uid))
            }
            MarkupSource::Matrix(matrix) => (matrix, None),
            MarkupSource::Raw(rows) => (ButtonMatrix::from_raw(rows)?, None),
        };

        if matrix.is_empty() {
            return Ok(None);
        }

        let unit_uid = ctx.unit_uid.clone().or_else(|| stored_uid.clone());
        let (minted, changed) = self.assign_tokens(&mut matrix, ctx, unit_uid.as_deref())?;

        if changed {
            if let Some(uid) = &stored_uid {
                self.units.set_buttons(uid, matrix.clone());
            }
        }

        if !minted.is_empty() {
            debug!(count = minted.len(), unit_uid = ?unit_uid, "Registered callback tokens");
        }

        Ok(Some(CompiledKeyboard {
            markup: render(&matrix),
            matrix,
            minted,
        }))
    }

    fn assign_tokens(
        &self,
        matrix: &mut ButtonMatrix,
        ctx: &RenderContext,
        unit_uid: Option<&str>,
    ) -> Result<(Vec<String>, bool), InlineError> {
        let mut minted: Vec<String> = Vec::new();
        let mut changed = false;
        // Resolved once, and only if something gets registered
        let mut default_flags: Option<Option<SecurityFlags>> = None;

        for button in matrix.rows_mut().iter_mut().flatten() {
            match &mut button.kind {
                ButtonKind::Callback(callback) if callback.token.is_none() => {
                    let Some(token) = self.mint_callback_token() else {
                        for token in &minted {
                            self.registry.unregister(token);
                        }
                        warn!(
                            token_len = self.callback_token_len,
                            "Could not mint a free callback token"
                        );
                        return Err(InlineError::TokenSpaceExhausted {
                            token_len: self.callback_token_len,
                        });
                    };
                    let flags = *default_flags.get_or_insert_with(|| self.resolver.resolve(ctx));
                    self.registry.register(
                        token.clone(),
                        CallbackRegistration::from_button(
                            callback,
                            flags,
                            unit_uid.map(str::to_string),
                        ),
                    );
                    callback.token = Some(token.clone());
                    minted.push(token);
                    changed = true;
                }
                ButtonKind::Input { token, .. } if token.is_none() => {
                    *token = Some(rand_token(self.switch_query_len));
                    changed = true;
                }
                _ => {}
            }
        }

        Ok((minted, changed))
    }

    fn mint_callback_token(&self) -> Option<String> {
        (0..MAX_MINT_ATTEMPTS)
            .map(|_| rand_token(self.callback_token_len))
            .find(|token| !self.registry.contains(token))
    }
}

/// Render a tokenized matrix; rows left empty after dropping buttons are skipped
fn render(matrix: &ButtonMatrix) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = matrix
        .rows()
        .iter()
        .map(|row| row.iter().filter_map(render_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    InlineKeyboardMarkup::new(rows)
}

fn render_button(button: &Button) -> Option<InlineKeyboardButton> {
    let text = button.text.clone();
    match &button.kind {
        ButtonKind::Url(url) => {
            if let Some(url) = parse_url(url) {
                Some(InlineKeyboardButton::url(text, url))
            } else {
                warn!(text = %button.text, url = %url, "Button has not been added, because its url is invalid");
                None
            }
        }
        ButtonKind::Callback(callback) => callback
            .token()
            .map(|token| InlineKeyboardButton::callback(text, token)),
        // The trailing space lets inline-query matching split the token from user input
        ButtonKind::Input { token, .. } => token
            .as_ref()
            .map(|token| InlineKeyboardButton::switch_inline_query_current_chat(text, format!("{token} "))),
        ButtonKind::Data(data) => Some(InlineKeyboardButton::callback(text, data.clone())),
        ButtonKind::SwitchQuery {
            query,
            current_chat: true,
        } => Some(InlineKeyboardButton::switch_inline_query_current_chat(
            text,
            query.clone(),
        )),
        ButtonKind::SwitchQuery {
            query,
            current_chat: false,
        } => Some(InlineKeyboardButton::switch_inline_query(text, query.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline::types::{CallbackButton, Unit};
    use crate::testing::NamedHandler;
    use std::collections::HashSet;
    use teloxide::types::{ChatId, InlineKeyboardButtonKind, MessageId};

    struct Fixture {
        registry: Arc<CallbackRegistry>,
        units: Arc<UnitStore>,
        compiler: MarkupCompiler,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(CallbackRegistry::new());
        let units = Arc::new(UnitStore::new());
        let compiler = MarkupCompiler::new(
            Arc::clone(&registry),
            Arc::clone(&units),
            Arc::new(SecurityResolver::new()),
            &InlineSettings::default(),
        );
        Fixture {
            registry,
            units,
            compiler,
        }
    }

    fn sample_matrix() -> ButtonMatrix {
        vec![
            vec![
                Button::callback("Yes", NamedHandler::arc("yes_cb")),
                Button::callback("No", NamedHandler::arc("no_cb")),
            ],
            vec![
                Button::url("Docs", "https://example.com/docs"),
                Button::input("Ask", "Type your question"),
            ],
            vec![Button::data("Raw", "raw-data")],
        ]
        .into()
    }

    fn kind_at(markup: &InlineKeyboardMarkup, row: usize, col: usize) -> &InlineKeyboardButtonKind {
        &markup.inline_keyboard[row][col].kind
    }

    #[test]
    fn test_empty_source_is_none() {
        let f = fixture();
        let compiled = f.compiler.compile(ButtonMatrix::default(), &RenderContext::default());
        assert!(matches!(compiled, Ok(None)));

        let compiled = f
            .compiler
            .compile(ButtonMatrix::new(vec![vec![], vec![]]), &RenderContext::default());
        assert!(matches!(compiled, Ok(None)));
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_compile_mints_and_registers() -> Result<(), InlineError> {
        let f = fixture();
        let compiled = f
            .compiler
            .compile(sample_matrix(), &RenderContext::with_security(SecurityFlags::OWNER))?
            .ok_or(InlineError::MissingText)?;

        assert_eq!(compiled.minted.len(), 2);
        assert_eq!(f.registry.len(), 2);
        for token in &compiled.minted {
            assert_eq!(token.len(), 30);
            let registration = f.registry.resolve(token);
            assert_eq!(
                registration.and_then(|r| r.default_flags),
                Some(SecurityFlags::OWNER)
            );
        }

        let markup = &compiled.markup;
        assert_eq!(markup.inline_keyboard.len(), 3);
        assert!(matches!(
            kind_at(markup, 0, 0),
            InlineKeyboardButtonKind::CallbackData(data) if *data == compiled.minted[0]
        ));
        assert!(matches!(kind_at(markup, 1, 0), InlineKeyboardButtonKind::Url(_)));
        assert!(matches!(
            kind_at(markup, 1, 1),
            InlineKeyboardButtonKind::SwitchInlineQueryCurrentChat(query)
                if query.len() == 11 && query.ends_with(' ')
        ));
        assert!(matches!(
            kind_at(markup, 2, 0),
            InlineKeyboardButtonKind::CallbackData(data) if data == "raw-data"
        ));
        Ok(())
    }

    #[test]
    fn test_recompiling_untokenized_mints_fresh_tokens() -> Result<(), InlineError> {
        let f = fixture();
        let ctx = RenderContext::default();
        let first = f.compiler.compile(sample_matrix(), &ctx)?.map(|c| c.minted);
        let second = f.compiler.compile(sample_matrix(), &ctx)?.map(|c| c.minted);

        let first: HashSet<String> = first.unwrap_or_default().into_iter().collect();
        let second: HashSet<String> = second.unwrap_or_default().into_iter().collect();
        assert_eq!(first.len(), 2);
        assert!(first.is_disjoint(&second));
        assert_eq!(f.registry.len(), 4);
        Ok(())
    }

    #[test]
    fn test_recompiling_tokenized_is_idempotent() -> Result<(), InlineError> {
        let f = fixture();
        let ctx = RenderContext::default();
        let first = f
            .compiler
            .compile(sample_matrix(), &ctx)?
            .ok_or(InlineError::MissingText)?;
        let second = f
            .compiler
            .compile(first.matrix.clone(), &ctx)?
            .ok_or(InlineError::MissingText)?;

        assert!(second.minted.is_empty());
        assert_eq!(f.registry.len(), 2);
        assert_eq!(first.markup, second.markup);
        Ok(())
    }

    #[test]
    fn test_invalid_url_is_dropped_not_fatal() -> Result<(), InlineError> {
        let f = fixture();
        let matrix: ButtonMatrix = vec![
            vec![Button::url("Bad", "not a url"), Button::data("Ok", "ok")],
            vec![Button::url("Also bad", "nope")],
        ]
        .into();
        let compiled = f
            .compiler
            .compile(matrix, &RenderContext::default())?
            .ok_or(InlineError::MissingText)?;

        assert_eq!(compiled.markup.inline_keyboard.len(), 1);
        assert_eq!(compiled.markup.inline_keyboard[0].len(), 1);
        assert_eq!(compiled.markup.inline_keyboard[0][0].text, "Ok");
        Ok(())
    }

    #[test]
    fn test_switch_query_variants() -> Result<(), InlineError> {
        let f = fixture();
        let matrix: ButtonMatrix = vec![
            Button::switch_query("Here", "q1", true),
            Button::switch_query("Elsewhere", "q2", false),
        ]
        .into();
        let compiled = f
            .compiler
            .compile(matrix, &RenderContext::default())?
            .ok_or(InlineError::MissingText)?;

        assert!(matches!(
            kind_at(&compiled.markup, 0, 0),
            InlineKeyboardButtonKind::SwitchInlineQueryCurrentChat(q) if q == "q1"
        ));
        assert!(matches!(
            kind_at(&compiled.markup, 0, 1),
            InlineKeyboardButtonKind::SwitchInlineQuery(q) if q == "q2"
        ));
        Ok(())
    }

    #[test]
    fn test_raw_ambiguous_button_fails_whole_compile() {
        let f = fixture();
        let rows = vec![
            vec![RawButton {
                text: Some("Fine".into()),
                callback: Some(NamedHandler::arc("ok_cb")),
                ..RawButton::default()
            }],
            vec![RawButton {
                text: Some("Broken".into()),
                url: Some("https://example.com".into()),
                callback: Some(NamedHandler::arc("cb")),
                ..RawButton::default()
            }],
        ];
        let compiled = f.compiler.compile(rows, &RenderContext::default());
        assert!(matches!(compiled, Err(InlineError::AmbiguousButton(_))));
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_raw_kindless_button_is_dropped() -> Result<(), InlineError> {
        let f = fixture();
        let row = vec![
            RawButton {
                text: Some("Nothing".into()),
                ..RawButton::default()
            },
            RawButton {
                text: Some("Data".into()),
                data: Some("d".into()),
                ..RawButton::default()
            },
        ];
        let compiled = f
            .compiler
            .compile(row, &RenderContext::default())?
            .ok_or(InlineError::MissingText)?;
        assert_eq!(compiled.markup.inline_keyboard[0].len(), 1);
        Ok(())
    }

    #[test]
    fn test_stored_source_writes_tokens_back() -> Result<(), InlineError> {
        let f = fixture();
        f.units.insert(
            Unit::new("u1", ChatId(1), MessageId(1)).with_buttons(Button::callback_with(
                "Go",
                CallbackButton::new(NamedHandler::arc("go_cb")).force_me(),
            )),
        );

        let first = f
            .compiler
            .compile(MarkupSource::stored("u1"), &RenderContext::default())?
            .ok_or(InlineError::MissingText)?;
        assert_eq!(first.minted.len(), 1);
        let registration = f.registry.resolve(&first.minted[0]);
        assert_eq!(registration.as_ref().and_then(|r| r.unit_uid.clone()), Some("u1".into()));
        assert_eq!(registration.map(|r| r.force_me), Some(true));

        let second = f
            .compiler
            .compile(MarkupSource::stored("u1"), &RenderContext::default())?
            .ok_or(InlineError::MissingText)?;
        assert!(second.minted.is_empty());
        assert_eq!(first.markup, second.markup);
        Ok(())
    }

    #[test]
    fn test_stored_source_requires_unit() {
        let f = fixture();
        let compiled = f
            .compiler
            .compile(MarkupSource::stored("ghost"), &RenderContext::default());
        assert!(matches!(compiled, Err(InlineError::UnitNotFound(uid)) if uid == "ghost"));
    }

    #[test]
    fn test_exhausted_token_space_fails_without_registering() {
        let registry = Arc::new(CallbackRegistry::new());
        let settings = InlineSettings {
            callback_token_len: 0,
            ..InlineSettings::default()
        };
        let compiler = MarkupCompiler::new(
            Arc::clone(&registry),
            Arc::new(UnitStore::new()),
            Arc::new(SecurityResolver::new()),
            &settings,
        );
        let matrix = vec![
            Button::callback("A", NamedHandler::arc("a_cb")),
            Button::callback("B", NamedHandler::arc("b_cb")),
        ];

        let compiled = compiler.compile(matrix, &RenderContext::default());
        assert!(matches!(
            compiled,
            Err(InlineError::TokenSpaceExhausted { token_len: 0 })
        ));
        assert!(registry.is_empty());
    }
}
