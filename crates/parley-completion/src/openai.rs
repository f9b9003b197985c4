use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use parley_core::config::CompletionConfig;

use crate::client::{CompletionClient, CompletionRequest};
use crate::credential::CredentialSlot;
use crate::error::CompletionError;
use crate::request::{build_request, extract_reply, ChatCompletionResponse, ErrorEnvelope};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
    credential: CredentialSlot,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("configured", &self.credential.is_set())
            .finish()
    }
}

impl OpenAiClient {
    /// Create an unconfigured client for `base_url` (without `/chat/completions`).
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CompletionError::NetworkError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            credential: CredentialSlot::default(),
        })
    }

    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        Self::new(&config.base_url, config.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn map_transport(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::NetworkError(format!("request timed out after {}s", self.timeout_secs))
        } else if e.is_connect() {
            CompletionError::NetworkError(format!("could not connect to {}", self.base_url))
        } else {
            CompletionError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn configure(&self, credential: &str) -> bool {
        let valid = self.credential.configure(credential);
        if !valid && !credential.trim().is_empty() {
            tracing::warn!("Rejected malformed API credential; client left unconfigured");
        }
        valid
    }

    fn is_configured(&self) -> bool {
        self.credential.is_set()
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        let credential = self.credential.get().ok_or(CompletionError::NotConfigured)?;
        let body = build_request(&request);
        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            attachments = request.attachments.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CompletionError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            tracing::warn!(status = status.as_u16(), error = %message, "Provider returned an error");
            return Err(CompletionError::ProviderError(message));
        }

        let bytes = response.bytes().await.map_err(|e| self.map_transport(e))?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| CompletionError::ProviderError(format!("invalid response body: {}", e)))?;
        Ok(extract_reply(parsed))
    }
}
