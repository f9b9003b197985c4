use parley_core::error::ParleyError;

/// Errors returned by a completion client. Never transported to the UI as
/// raw errors; the orchestrator turns them into error turns via
/// [`CompletionError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("completion client not configured")]
    NotConfigured,

    #[error("provider rejected the credential")]
    Unauthorized,

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("provider error: {0}")]
    ProviderError(String),
}

impl CompletionError {
    /// Text shown to the user in the error turn.
    pub fn user_message(&self) -> String {
        match self {
            CompletionError::NotConfigured => {
                "The OpenAI API key is not configured. Add a valid API key in the settings to start chatting.".to_string()
            }
            CompletionError::Unauthorized => {
                "The API key was rejected by the provider. Check the API key in the settings.".to_string()
            }
            CompletionError::RateLimited => {
                "The provider's rate limit was exceeded. Wait a moment and try again.".to_string()
            }
            CompletionError::NetworkError(detail) => {
                format!("Could not reach the provider: {}. Check your network connection.", detail)
            }
            CompletionError::ProviderError(message) => {
                format!("The provider returned an error: {}", message)
            }
        }
    }
}

impl From<CompletionError> for ParleyError {
    fn from(err: CompletionError) -> Self {
        ParleyError::Completion(err.to_string())
    }
}
