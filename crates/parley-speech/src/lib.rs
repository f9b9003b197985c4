//! Speech capture adapter for Parley.
//!
//! Wraps a platform speech recognizer behind `RecognitionBackend` and turns
//! its events into transcript callbacks. One capture session runs at a time;
//! ending a session (or dropping its `CaptureSubscription`) guarantees no
//! callback fires afterwards.

pub mod backend;
pub mod capture;
pub mod error;
pub mod state;

pub use backend::{RecognitionBackend, RecognitionEvent, ScriptedBackend, UnsupportedBackend};
pub use capture::{CaptureSubscription, SpeechCapture, TranscriptCallbacks};
pub use error::SpeechError;
pub use state::CaptureState;
