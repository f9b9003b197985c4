//! Parley core crate - shared domain types, application configuration, and errors.
//!
//! Every other Parley crate depends on this one for the conversation data
//! model (messages, attachments, feedback, chat settings) and the top-level
//! `ParleyError`.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use events::ConversationEvent;
pub use types::*;
