//! Conversation engine for Parley.
//!
//! - **orchestrator**: owns the message log and drives each user turn through
//!   the completion client
//! - **composer**: the composition buffer (draft text, pending attachments, dictation)
//! - **settings**: the persisted chat settings and their storage seam

pub mod composer;
pub mod error;
pub mod orchestrator;
pub mod settings;

pub use composer::Composer;
pub use error::ChatError;
pub use orchestrator::{ConversationOrchestrator, PendingTurn, TurnOutcome};
pub use settings::{FileStorage, KeyValueStorage, MemoryStorage, SettingsStore, SETTINGS_KEY};
