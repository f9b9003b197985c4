//! Error types for the conversation engine.

use parley_attachments::AttachmentError;
use parley_core::error::ParleyError;
use parley_speech::SpeechError;
use uuid::Uuid;

/// Rejections returned to the caller. Provider failures never surface here;
/// they become error turns in the log.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptySubmission,
    #[error("a reply is still pending")]
    Busy,
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),
    #[error("message already has feedback: {0}")]
    AlreadyRated(Uuid),
    #[error("feedback can only be given on assistant turns: {0}")]
    FeedbackOnUserTurn(Uuid),
    #[error("voice input is disabled")]
    VoiceDisabled,
    #[error("speech error: {0}")]
    Speech(#[from] SpeechError),
    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),
    #[error("settings error: {0}")]
    Settings(String),
    #[error("conversation state unavailable: {0}")]
    StateUnavailable(String),
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        ChatError::Settings(err.to_string())
    }
}
