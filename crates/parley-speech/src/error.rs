use parley_core::error::ParleyError;

/// Errors produced by the speech capture adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("speech recognition error: {0}")]
    Backend(String),
}

impl From<SpeechError> for ParleyError {
    fn from(err: SpeechError) -> Self {
        ParleyError::Speech(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SpeechError::Backend("no-speech".to_string()).to_string(),
            "speech recognition error: no-speech"
        );
        assert!(SpeechError::Unsupported.to_string().contains("not supported"));
    }

    #[test]
    fn test_into_parley_error() {
        let err: ParleyError = SpeechError::AlreadyActive.into();
        assert!(matches!(err, ParleyError::Speech(msg) if msg.contains("already active")));
    }
}
