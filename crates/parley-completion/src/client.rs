use std::sync::Arc;

use async_trait::async_trait;

use parley_core::types::{Attachment, ChatConfig, Message};

use crate::error::CompletionError;

/// An attachment of the newest user turn, with its bytes if they could be
/// read from the locator store.
#[derive(Debug, Clone)]
pub struct AttachmentPayload {
    pub attachment: Attachment,
    /// `None` when the locator no longer resolves.
    pub content: Option<Arc<[u8]>>,
}

impl AttachmentPayload {
    pub fn new(attachment: Attachment, content: Option<Arc<[u8]>>) -> Self {
        Self {
            attachment,
            content,
        }
    }
}

/// One completion call: the full non-error history (newest user turn last),
/// the settings to sample with, and that turn's attachments.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub history: &'a [Message],
    pub config: &'a ChatConfig,
    pub attachments: &'a [AttachmentPayload],
}

impl<'a> CompletionRequest<'a> {
    pub fn new(
        history: &'a [Message],
        config: &'a ChatConfig,
        attachments: &'a [AttachmentPayload],
    ) -> Self {
        Self {
            history,
            config,
            attachments,
        }
    }

    /// Content of the most recent user turn, if any.
    pub fn latest_user_content(&self) -> Option<&'a str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
    }
}

/// A chat-completions provider.
///
/// `configure` installs a credential and reports whether it was accepted; an
/// invalid credential leaves the client unconfigured. `complete` makes at
/// most one provider call and never retries.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    fn configure(&self, credential: &str) -> bool;

    fn is_configured(&self) -> bool;

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError>;
}
