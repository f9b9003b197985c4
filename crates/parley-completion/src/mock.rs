//! Scripted completion client for tests of code built on `CompletionClient`.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use parley_core::types::{ChatConfig, Message};

use crate::client::{AttachmentPayload, CompletionClient, CompletionRequest};
use crate::credential::CredentialSlot;
use crate::error::CompletionError;
use crate::request::{build_request, ChatCompletionRequest};

/// What a `MockCompletionClient` was asked.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub history: Vec<Message>,
    pub config: ChatConfig,
    pub attachments: Vec<AttachmentPayload>,
    /// The body an HTTP client would have sent.
    pub wire: ChatCompletionRequest,
}

/// Returns queued results in order, then `default_reply`.
#[derive(Debug)]
pub struct MockCompletionClient {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    default_reply: String,
    delay: Duration,
    require_credential: bool,
    credential: CredentialSlot,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new("mock reply")
    }
}

impl MockCompletionClient {
    pub fn new(default_reply: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            delay: Duration::ZERO,
            require_credential: false,
            credential: CredentialSlot::default(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses(self, responses: Vec<Result<String, CompletionError>>) -> Self {
        *self.responses.lock().unwrap_or_else(PoisonError::into_inner) = responses.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Behave like a real provider: fail `NotConfigured` without a valid
    /// credential, before recording anything.
    pub fn with_require_credential(mut self, require: bool) -> Self {
        self.require_credential = require;
        self
    }

    pub fn push_response(&self, response: Result<String, CompletionError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn name(&self) -> &str {
        "mock"
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
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                history: request.history.to_vec(),
                config: request.config.clone(),
                attachments: request.attachments.to_vec(),
                wire: build_request(&request),
            });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_reply.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_then_default() {
        let client = MockCompletionClient::new("fallback")
            .with_responses(vec![Ok("first".into()), Err(CompletionError::RateLimited)]);
        let config = ChatConfig::default();
        let history = vec![Message::user("hi", vec![])];
        let req = CompletionRequest::new(&history, &config, &[]);

        assert_eq!(client.complete(req).await, Ok("first".to_string()));
        assert_eq!(client.complete(req).await, Err(CompletionError::RateLimited));
        assert_eq!(client.complete(req).await, Ok("fallback".to_string()));
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.requests()[0].wire.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_required_credential_not_recorded() {
        let client = MockCompletionClient::default().with_require_credential(true);
        let config = ChatConfig::default();
        let history = vec![Message::user("hi", vec![])];
        let result = client
            .complete(CompletionRequest::new(&history, &config, &[]))
            .await;
        assert_eq!(result, Err(CompletionError::NotConfigured));
        assert_eq!(client.call_count(), 0);
    }
}
