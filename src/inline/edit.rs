//! Edit protocol
//!
//! Validates an edit request, resolves the inline message to edit, compiles
//! the keyboard and dispatches a text or media edit. Flood waits are waited
//! out and the identical call is re-issued; "not modified" and "message
//! deleted" responses complete without an error.

use super::markup::MarkupSource;
use super::security::{RenderContext, SecurityFlags};
use super::types::{ButtonMatrix, UnitPatch};
use super::{InlineError, InlineManager};
use crate::transport::{Interaction, TransportError};
use crate::utils::{extension_for_mime, is_animation_url, parse_url};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{
    InlineKeyboardMarkup, InputFile, InputMedia, InputMediaAnimation, InputMediaAudio,
    InputMediaDocument, InputMediaPhoto, InputMediaVideo, ParseMode,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// File attached to an edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Remote file
    Url(String),
    /// In-memory file; needs a MIME type
    Bytes(Vec<u8>),
}

/// How an edit completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The message was edited
    Edited,
    /// The message already had the requested content
    Unchanged,
    /// The message no longer exists
    MessageGone,
}

/// A single edit of a unit's message, captured as a value so flood-wait
/// retries re-issue exactly the same call
#[derive(Clone, Default)]
pub struct EditRequest {
    /// New text, or caption when media is set
    pub text: String,
    /// New keyboard; `None` re-renders the unit's stored buttons
    pub markup: Option<MarkupSource>,
    /// Photo URL
    pub photo: Option<String>,
    /// Document
    pub file: Option<FileSource>,
    /// Video URL
    pub video: Option<String>,
    /// Audio URL
    pub audio: Option<String>,
    /// Animation URL
    pub gif: Option<String>,
    /// MIME type of an in-memory `file`
    pub mime_type: Option<String>,
    /// New unit-level `force_me`
    pub force_me: Option<bool>,
    /// New unit-level `disable_security`
    pub disable_security: Option<bool>,
    /// New unit-level `always_allow`
    pub always_allow: Option<Vec<i64>>,
    /// Web-page preview preference; the configured default when unset
    pub disable_web_page_preview: Option<bool>,
    /// Security flags of the entry point issuing the edit
    pub security: Option<SecurityFlags>,
    /// Interaction that triggered the edit
    pub interaction: Option<Arc<dyn Interaction>>,
    /// Unit being edited
    pub unit_uid: Option<String>,
    /// Inline message to edit, overriding the unit's
    pub inline_message_id: Option<String>,
    /// Cancels the edit while it waits out a flood wait
    pub cancel: Option<CancellationToken>,
}

impl EditRequest {
    /// Text edit request
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Replace the keyboard
    #[must_use]
    pub fn markup(mut self, markup: impl Into<MarkupSource>) -> Self {
        self.markup = Some(markup.into());
        self
    }

    /// Swap in a photo
    #[must_use]
    pub fn photo(mut self, url: impl Into<String>) -> Self {
        self.photo = Some(url.into());
        self
    }

    /// Swap in a remote document
    #[must_use]
    pub fn file_url(mut self, url: impl Into<String>) -> Self {
        self.file = Some(FileSource::Url(url.into()));
        self
    }

    /// Swap in an in-memory document
    #[must_use]
    pub fn file_bytes(mut self, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.file = Some(FileSource::Bytes(bytes));
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Swap in a video
    #[must_use]
    pub fn video(mut self, url: impl Into<String>) -> Self {
        self.video = Some(url.into());
        self
    }

    /// Swap in an audio track
    #[must_use]
    pub fn audio(mut self, url: impl Into<String>) -> Self {
        self.audio = Some(url.into());
        self
    }

    /// Swap in an animation
    #[must_use]
    pub fn gif(mut self, url: impl Into<String>) -> Self {
        self.gif = Some(url.into());
        self
    }

    /// Edit the stored unit `uid`
    #[must_use]
    pub fn unit(mut self, uid: impl Into<String>) -> Self {
        self.unit_uid = Some(uid.into());
        self
    }

    /// Edit this inline message
    #[must_use]
    pub fn inline_message_id(mut self, id: impl Into<String>) -> Self {
        self.inline_message_id = Some(id.into());
        self
    }

    /// Attach the triggering interaction
    #[must_use]
    pub fn interaction(mut self, interaction: Arc<dyn Interaction>) -> Self {
        self.interaction = Some(interaction);
        self
    }

    /// Set security flags for newly registered buttons
    #[must_use]
    pub const fn security(mut self, flags: SecurityFlags) -> Self {
        self.security = Some(flags);
        self
    }

    /// Set the web-page preview preference
    #[must_use]
    pub const fn disable_web_page_preview(mut self, disable: bool) -> Self {
        self.disable_web_page_preview = Some(disable);
        self
    }

    /// Make flood-wait sleeps cancellable
    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn unit_patch(&self, buttons: Option<ButtonMatrix>) -> UnitPatch {
        UnitPatch {
            buttons,
            force_me: self.force_me,
            disable_security: self.disable_security,
            always_allow: self.always_allow.clone(),
        }
    }
}

/// Validated media of an edit
#[derive(Debug, Clone, PartialEq, Eq)]
enum Media {
    Photo(Url),
    Animation(Url),
    Video(Url),
    Audio(Url),
    DocumentUrl(Url),
    DocumentBytes { bytes: Vec<u8>, mime_type: String },
}

impl Media {
    fn into_input_media(self, caption: &str) -> InputMedia {
        let file = match &self {
            Self::Photo(url)
            | Self::Animation(url)
            | Self::Video(url)
            | Self::Audio(url)
            | Self::DocumentUrl(url) => InputFile::url(url.clone()),
            Self::DocumentBytes { bytes, mime_type } => InputFile::memory(bytes.clone())
                .file_name(format!("file.{}", extension_for_mime(mime_type))),
        };

        let caption = caption.to_string();
        match self {
            Self::Photo(_) => InputMedia::Photo(
                InputMediaPhoto::new(file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html),
            ),
            Self::Animation(_) => InputMedia::Animation(
                InputMediaAnimation::new(file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html),
            ),
            Self::Video(_) => InputMedia::Video(
                InputMediaVideo::new(file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html),
            ),
            Self::Audio(_) => InputMedia::Audio(
                InputMediaAudio::new(file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html),
            ),
            Self::DocumentUrl(_) | Self::DocumentBytes { .. } => InputMedia::Document(
                InputMediaDocument::new(file)
                    .caption(caption)
                    .parse_mode(ParseMode::Html),
            ),
        }
    }
}

fn require_url(field: &'static str, value: &str) -> Result<Url, InlineError> {
    parse_url(value).ok_or_else(|| InlineError::InvalidUrl {
        field,
        url: value.to_string(),
    })
}

/// Check the media parameters and pick the single media payload, if any.
fn validate_media(request: &EditRequest) -> Result<Option<Media>, InlineError> {
    let set: Vec<&'static str> = [
        ("photo", request.photo.is_some()),
        ("file", request.file.is_some()),
        ("video", request.video.is_some()),
        ("audio", request.audio.is_some()),
        ("gif", request.gif.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    if set.len() > 1 {
        return Err(InlineError::ExclusiveMedia(set.join(", ")));
    }

    if let Some(photo) = &request.photo {
        let url = require_url("photo", photo)?;
        // Telegram plays gif/mp4 "photos" only as animations
        return Ok(Some(if is_animation_url(photo) {
            Media::Animation(url)
        } else {
            Media::Photo(url)
        }));
    }
    if let Some(gif) = &request.gif {
        return Ok(Some(Media::Animation(require_url("gif", gif)?)));
    }
    if let Some(video) = &request.video {
        return Ok(Some(Media::Video(require_url("video", video)?)));
    }
    if let Some(audio) = &request.audio {
        return Ok(Some(Media::Audio(require_url("audio", audio)?)));
    }
    match &request.file {
        Some(FileSource::Url(url)) => Ok(Some(Media::DocumentUrl(require_url("file", url)?))),
        Some(FileSource::Bytes(bytes)) => {
            let mime_type = request
                .mime_type
                .clone()
                .ok_or(InlineError::MissingMimeType)?;
            Ok(Some(Media::DocumentBytes {
                bytes: bytes.clone(),
                mime_type,
            }))
        }
        None => Ok(None),
    }
}

/// Best-effort acknowledgement; errors are logged and dropped
async fn acknowledge(interaction: Option<&Arc<dyn Interaction>>, text: Option<String>) {
    if let Some(interaction) = interaction {
        if let Err(e) = interaction.answer(text).await {
            debug!(error = %e, "Failed to answer interaction");
        }
    }
}

async fn wait_out(wait: Duration, cancel: Option<&CancellationToken>) -> Result<(), InlineError> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(InlineError::Cancelled),
                () = tokio::time::sleep(wait) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(wait).await;
            Ok(())
        }
    }
}

impl InlineManager {
    /// Edit a unit's message in place.
    ///
    /// Returns the [`EditOutcome`]; "not modified" on a text edit and a
    /// deleted message are reported as outcomes, not errors. On
    /// [`EditOutcome::Edited`] or [`EditOutcome::Unchanged`] the stored unit
    /// is patched with the compiled buttons (when the request carried markup)
    /// and the ACL overrides present in the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any transport call,
    /// [`InlineError::NoInlineMessageId`] when no target can be resolved, a
    /// structural error from compiling raw markup, [`InlineError::RateLimited`]
    /// or [`InlineError::Cancelled`] from flood-wait handling, and any other
    /// transport failure as [`InlineError::Transport`].
    pub async fn edit_unit(&self, request: EditRequest) -> Result<EditOutcome, InlineError> {
        let media = validate_media(&request).inspect_err(|e| {
            error!(error = %e, "Rejected edit");
        })?;

        let unit = request
            .unit_uid
            .as_deref()
            .and_then(|uid| self.units.get(uid));

        let Some(inline_message_id) = request
            .inline_message_id
            .clone()
            .or_else(|| unit.as_ref().and_then(|u| u.inline_message_id.clone()))
            .or_else(|| {
                request
                    .interaction
                    .as_ref()
                    .and_then(|interaction| interaction.inline_message_id())
            })
        else {
            warn!(
                unit_uid = ?request.unit_uid,
                "Attempted to edit message with no `inline_message_id`. The unit was probably \
                 sent without buttons and can't be edited"
            );
            return Err(InlineError::NoInlineMessageId);
        };

        let ctx = RenderContext {
            security: request.security,
            unit_uid: request.unit_uid.clone(),
        };
        let compiled = match (&request.markup, &unit) {
            (Some(source), _) => self.compiler.compile(source.clone(), &ctx)?,
            (None, Some(unit)) => self
                .compiler
                .compile(MarkupSource::stored(unit.uid.clone()), &ctx)?,
            (None, None) => None,
        };
        let reply_markup: Option<InlineKeyboardMarkup> =
            compiled.as_ref().map(|c| c.markup.clone());

        let outcome = self
            .dispatch_edit(&request, &inline_message_id, media, reply_markup)
            .await?;

        if outcome != EditOutcome::MessageGone {
            if let Some(uid) = &request.unit_uid {
                let buttons = request
                    .markup
                    .as_ref()
                    .map(|_| compiled.map(|c| c.matrix).unwrap_or_default());
                let patch = request.unit_patch(buttons);
                if !patch.is_empty() && self.units.contains(uid) {
                    self.units.upsert(uid, patch);
                }
            }
        }

        Ok(outcome)
    }

    async fn dispatch_edit(
        &self,
        request: &EditRequest,
        inline_message_id: &str,
        media: Option<Media>,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<EditOutcome, InlineError> {
        let disable_preview = request
            .disable_web_page_preview
            .unwrap_or(self.settings.disable_web_page_preview);
        let input_media = media.map(|m| m.into_input_media(&request.text));
        let mut retries: u32 = 0;

        loop {
            let result = match &input_media {
                None => {
                    self.transport
                        .edit_message_text(
                            inline_message_id,
                            &request.text,
                            reply_markup.clone(),
                            disable_preview,
                        )
                        .await
                }
                Some(media) => {
                    self.transport
                        .edit_message_media(inline_message_id, media.clone(), reply_markup.clone())
                        .await
                }
            };

            match result {
                Ok(()) => {
                    if retries > 0 {
                        info!(retries, "Edit succeeded after flood wait");
                    }
                    return Ok(EditOutcome::Edited);
                }
                Err(TransportError::RetryAfter(wait)) => {
                    if !self.settings.allows_floodwait_retry(retries) {
                        warn!(retries, wait_secs = wait.as_secs(), "Giving up on flood wait");
                        return Err(InlineError::RateLimited {
                            retries,
                            last_wait: wait,
                        });
                    }
                    info!(wait_secs = wait.as_secs(), "Sleeping on FloodWait...");
                    wait_out(wait, request.cancel.as_ref()).await?;
                    retries += 1;
                }
                Err(TransportError::MessageNotModified) if input_media.is_none() => {
                    debug!(inline_message_id, "Message is not modified");
                    acknowledge(request.interaction.as_ref(), None).await;
                    return Ok(EditOutcome::Unchanged);
                }
                Err(TransportError::MessageIdInvalid) => {
                    debug!(inline_message_id, "Message to edit is deleted");
                    acknowledge(
                        request.interaction.as_ref(),
                        Some(self.settings.deleted_message_notice.clone()),
                    )
                    .await;
                    return Ok(EditOutcome::MessageGone);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
