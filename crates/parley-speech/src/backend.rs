//! Recognition backends.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SpeechError;

/// An event produced by a recognizer during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Interim hypothesis; replaces the previous partial.
    Partial(String),
    /// Committed transcript segment.
    Final(String),
    /// Recognizer failure. Terminates the session.
    Error(String),
    /// Recognizer stopped on its own.
    Ended,
}

/// A platform speech recognizer.
///
/// `start` begins delivering events on `events` until `stop` is called or the
/// backend sends `Error` or `Ended`. Implementations must tolerate `stop`
/// without a prior `start`.
pub trait RecognitionBackend: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn start(&self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<(), SpeechError>;

    fn stop(&self);
}

// =============================================================================
// Unsupported
// =============================================================================

/// Backend for platforms without a recognizer.
#[derive(Debug, Default)]
pub struct UnsupportedBackend;

impl RecognitionBackend for UnsupportedBackend {
    fn name(&self) -> &str {
        "unsupported"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn start(&self, _events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<(), SpeechError> {
        Err(SpeechError::Unsupported)
    }

    fn stop(&self) {}
}

// =============================================================================
// Scripted
// =============================================================================

/// Replays a fixed list of events on every session.
///
/// With a zero interval the whole script is queued inside `start`. With a
/// non-zero interval a tokio task emits one event per tick, so `start` must
/// then be called from within a runtime. When the script has no terminal
/// event the session stays open until `stop`.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Vec<RecognitionEvent>,
    interval: Duration,
    sender: Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<RecognitionEvent>) -> Self {
        Self {
            script,
            interval: Duration::ZERO,
            sender: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Each phrase becomes a final transcript, followed by `Ended`.
    pub fn from_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script: Vec<RecognitionEvent> = phrases
            .into_iter()
            .map(|p| RecognitionEvent::Final(p.into()))
            .collect();
        script.push(RecognitionEvent::Ended);
        Self::new(script)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl RecognitionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn start(&self, events: mpsc::UnboundedSender<RecognitionEvent>) -> Result<(), SpeechError> {
        if self.interval.is_zero() {
            for event in &self.script {
                events
                    .send(event.clone())
                    .map_err(|_| SpeechError::Backend("event channel closed".to_string()))?;
            }
        } else {
            let script = self.script.clone();
            let interval = self.interval;
            let tx = events.clone();
            let handle = tokio::spawn(async move {
                for event in script {
                    tokio::time::sleep(interval).await;
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            });
            *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
        // Holding the sender keeps an unterminated script's session open.
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(events);
        tracing::debug!(events = self.script.len(), "Scripted recognition started");
        Ok(())
    }

    fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
