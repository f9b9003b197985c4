//! Application state shared across all route handlers.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use parley_chat::{Composer, ConversationOrchestrator};
use parley_core::config::ParleyConfig;
use parley_speech::SpeechCapture;

/// Shared application state.
///
/// All fields are cheap to clone. The draft is behind a `Mutex` and is never
/// held across an await.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ParleyConfig>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// The single server-side composition buffer.
    pub composer: Arc<Mutex<Composer>>,
    pub speech: SpeechCapture,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ParleyConfig,
        orchestrator: Arc<ConversationOrchestrator>,
        speech: SpeechCapture,
    ) -> Self {
        let composer = Composer::new(Arc::clone(orchestrator.locators()));
        Self {
            config: Arc::new(config),
            orchestrator,
            composer: Arc::new(Mutex::new(composer)),
            speech,
            start_time: Instant::now(),
        }
    }
}
