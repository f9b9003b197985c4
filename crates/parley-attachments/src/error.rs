//! Error types for attachment handling.

use parley_core::error::ParleyError;
use parley_core::types::Locator;

/// Errors from the locator store and attachment manager.
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("locator not found: {0}")]
    LocatorNotFound(Locator),
    #[error("locator store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<AttachmentError> for ParleyError {
    fn from(err: AttachmentError) -> Self {
        ParleyError::Attachment(err.to_string())
    }
}
