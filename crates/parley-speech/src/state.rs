//! Capture session state machine.
//!
//! - Idle -> Listening (session started)
//! - Listening -> Idle (session ended, errored, or cancelled)

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SpeechError;

/// Whether the adapter currently has a live recognition session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CaptureState {
    #[default]
    Idle,
    Listening,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Listening => write!(f, "Listening"),
        }
    }
}

impl CaptureState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &CaptureState) -> bool {
        matches!(
            (self, target),
            (CaptureState::Idle, CaptureState::Listening)
                | (CaptureState::Listening, CaptureState::Idle)
        )
    }
}

/// Shared, validated capture state.
#[derive(Debug, Clone, Default)]
pub(crate) struct CaptureStateMachine {
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureStateMachine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn current(&self) -> CaptureState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transition(&self, target: CaptureState) -> Result<(), SpeechError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.can_transition_to(&target) {
            tracing::debug!("Capture state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else if *state == CaptureState::Listening {
            Err(SpeechError::AlreadyActive)
        } else {
            Err(SpeechError::Backend(format!(
                "invalid capture transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state back to Idle.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = CaptureState::Idle;
    }
}

// =============================================================================
// Tests
// =============================================================================
