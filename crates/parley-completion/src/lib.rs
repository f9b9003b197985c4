//! Completion client boundary for Parley.
//!
//! `CompletionClient` is the seam between the conversation orchestrator and
//! a chat-completions provider. `OpenAiClient` talks to an OpenAI-compatible
//! HTTP endpoint; `SimulatedClient` answers offline with an echo.

pub mod client;
pub mod credential;
pub mod error;
pub mod mock;
pub mod openai;
pub mod request;
pub mod simulated;

pub use client::{AttachmentPayload, CompletionClient, CompletionRequest};
pub use credential::validate_credential;
pub use error::CompletionError;
pub use mock::MockCompletionClient;
pub use openai::OpenAiClient;
pub use simulated::SimulatedClient;
