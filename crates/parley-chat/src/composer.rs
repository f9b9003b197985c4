//! Composition buffer: draft text, pending attachments, and dictation.

use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use parley_attachments::{AttachmentManager, FileInput, LocatorStore};
use parley_core::types::Attachment;
use parley_speech::{CaptureSubscription, SpeechCapture, SpeechError, TranscriptCallbacks};

use crate::error::ChatError;

/// Text state shared with the dictation callbacks.
#[derive(Debug, Default)]
struct DraftText {
    text: String,
    partial: String,
    last_speech_error: Option<SpeechError>,
}

impl DraftText {
    fn append_final(&mut self, transcript: &str) {
        let transcript = transcript.trim();
        if !transcript.is_empty() {
            if !self.text.is_empty() && !self.text.ends_with(char::is_whitespace) {
                self.text.push(' ');
            }
            self.text.push_str(transcript);
        }
        self.partial.clear();
    }
}

/// The user's in-progress turn.
#[derive(Debug)]
pub struct Composer {
    draft: Arc<Mutex<DraftText>>,
    attachments: AttachmentManager,
    dictation: Option<CaptureSubscription>,
}

impl Composer {
    pub fn new(store: Arc<LocatorStore>) -> Self {
        Self {
            draft: Arc::default(),
            attachments: AttachmentManager::new(store),
            dictation: None,
        }
    }

    fn draft(&self) -> std::sync::MutexGuard<'_, DraftText> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn text(&self) -> String {
        self.draft().text.clone()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.draft().text = text.into();
    }

    /// Current interim transcript, if dictating.
    pub fn partial(&self) -> String {
        self.draft().partial.clone()
    }

    /// Draft text followed by the interim transcript.
    pub fn display_text(&self) -> String {
        let draft = self.draft();
        match (draft.text.is_empty(), draft.partial.is_empty()) {
            (_, true) => draft.text.clone(),
            (true, false) => draft.partial.clone(),
            (false, false) => format!("{} {}", draft.text, draft.partial),
        }
    }

    pub fn attach(&mut self, files: Vec<FileInput>) -> Result<Vec<Attachment>, ChatError> {
        Ok(self.attachments.ingest(files)?)
    }

    pub fn remove_attachment(&mut self, attachment_id: Uuid) -> bool {
        self.attachments.remove(attachment_id)
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.pending()
    }

    pub fn attachment(&self, attachment_id: Uuid) -> Option<&Attachment> {
        self.attachments.get(attachment_id)
    }

    pub fn locator_store(&self) -> &Arc<LocatorStore> {
        self.attachments.store()
    }

    /// Whether a submission of the current draft would be rejected as empty.
    pub fn is_empty(&self) -> bool {
        self.draft().text.trim().is_empty() && self.attachments.is_empty()
    }

    /// Clear the text and release every pending attachment.
    pub fn discard(&mut self) {
        self.stop_dictation();
        {
            let mut draft = self.draft();
            draft.text.clear();
            draft.partial.clear();
        }
        self.attachments.clear();
    }

    /// Snapshot of what a send would submit.
    pub(crate) fn submission(&self) -> (String, Vec<Attachment>) {
        (self.text(), self.attachments.pending().to_vec())
    }

    /// Clear the draft after an accepted send. Attachment ownership has moved
    /// to the user turn, so nothing is released.
    pub(crate) fn mark_sent(&mut self) {
        self.draft().text.clear();
        self.attachments.take_pending();
    }

    // -------------------------------------------------------------------------
    // Dictation
    // -------------------------------------------------------------------------

    /// Start dictating into the draft.
    ///
    /// Final transcripts are appended to the text; partials are shown through
    /// `display_text` until replaced.
    pub fn start_dictation(
        &mut self,
        capture: &SpeechCapture,
        enable_voice: bool,
    ) -> Result<(), ChatError> {
        if !enable_voice {
            return Err(ChatError::VoiceDisabled);
        }
        if self.is_dictating() {
            return Err(ChatError::Speech(SpeechError::AlreadyActive));
        }

        let on_partial = Arc::clone(&self.draft);
        let on_final = Arc::clone(&self.draft);
        let on_error = Arc::clone(&self.draft);
        let callbacks = TranscriptCallbacks::new()
            .on_partial(move |t| {
                on_partial.lock().unwrap_or_else(PoisonError::into_inner).partial = t.to_string();
            })
            .on_final(move |t| {
                on_final
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append_final(t);
            })
            .on_error(move |e| {
                let mut draft = on_error.lock().unwrap_or_else(PoisonError::into_inner);
                draft.partial.clear();
                draft.last_speech_error = Some(e.clone());
            });

        self.draft().last_speech_error = None;
        self.dictation = Some(capture.begin(callbacks)?);
        Ok(())
    }

    pub fn stop_dictation(&mut self) {
        if let Some(mut subscription) = self.dictation.take() {
            subscription.end();
        }
        self.draft().partial.clear();
    }

    pub fn is_dictating(&self) -> bool {
        self.dictation.as_ref().is_some_and(|s| s.is_active())
    }

    /// The error that ended the last dictation session, if any.
    pub fn last_speech_error(&self) -> Option<SpeechError> {
        self.draft().last_speech_error.clone()
    }
}
