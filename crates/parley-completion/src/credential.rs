//! Provider credential validation and storage.

use std::sync::{PoisonError, RwLock};

/// Required prefix of an OpenAI-style API key.
pub const CREDENTIAL_PREFIX: &str = "sk-";

/// Shortest accepted credential, prefix included.
pub const MIN_CREDENTIAL_LEN: usize = 20;

/// Returns the trimmed credential if it looks like a usable API key.
///
/// A valid credential is non-empty after trimming, starts with `sk-`, is at
/// least 20 characters long and contains no interior whitespace.
pub fn validate_credential(raw: &str) -> Option<&str> {
    let credential = raw.trim();
    let valid = credential.starts_with(CREDENTIAL_PREFIX)
        && credential.chars().count() >= MIN_CREDENTIAL_LEN
        && !credential.chars().any(char::is_whitespace);
    valid.then_some(credential)
}

/// The credential currently installed in a client.
#[derive(Debug, Default)]
pub(crate) struct CredentialSlot {
    value: RwLock<Option<String>>,
}

impl CredentialSlot {
    /// Install `raw` if valid, otherwise clear the slot. Returns validity.
    pub(crate) fn configure(&self, raw: &str) -> bool {
        let validated = validate_credential(raw).map(str::to_string);
        let valid = validated.is_some();
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = validated;
        valid
    }

    pub(crate) fn get(&self) -> Option<String> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
