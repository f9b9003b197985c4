use std::time::Duration;

use async_trait::async_trait;

use parley_core::config::CompletionConfig;

use crate::client::{CompletionClient, CompletionRequest};
use crate::credential::CredentialSlot;
use crate::error::CompletionError;

/// Offline provider that echoes the newest user turn after a fixed delay.
#[derive(Debug)]
pub struct SimulatedClient {
    delay: Duration,
    require_credential: bool,
    credential: CredentialSlot,
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl SimulatedClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            require_credential: false,
            credential: CredentialSlot::default(),
        }
    }

    pub fn from_config(config: &CompletionConfig) -> Self {
        Self::new(Duration::from_millis(config.simulated_delay_ms))
    }

    /// Fail with `NotConfigured` unless a valid credential is installed.
    pub fn with_require_credential(mut self, require: bool) -> Self {
        self.require_credential = require;
        self
    }

    /// The reply text for `content` with `attachment_count` files.
    pub fn reply_for(content: &str, attachment_count: usize) -> String {
        let mut reply = format!("I received your message: \"{}\".", content);
        if attachment_count > 0 {
            reply.push_str(&format!(
                " I also see you've attached {} file(s).",
                attachment_count
            ));
        }
        reply.push_str(" How can I help you further?");
        reply
    }
}

#[async_trait]
impl CompletionClient for SimulatedClient {
    fn name(&self) -> &str {
        "simulated"
    }

    fn configure(&self, credential: &str) -> bool {
        self.credential.configure(credential)
    }

    fn is_configured(&self) -> bool {
        !self.require_credential || self.credential.is_set()
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        if !self.is_configured() {
            return Err(CompletionError::NotConfigured);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = request.latest_user_content().unwrap_or_default();
        Ok(Self::reply_for(content, request.attachments.len()))
    }
}
