//! Speech capture adapter and its cancellable subscription.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{RecognitionBackend, RecognitionEvent};
use crate::error::SpeechError;
use crate::state::{CaptureState, CaptureStateMachine};

type TextCallback = Box<dyn Fn(&str) + Send>;
type ErrorCallback = Box<dyn Fn(&SpeechError) + Send>;

/// Receivers for transcript events. Unset callbacks are no-ops.
///
/// A callback may end its own session; no further callback fires after it
/// returns.
pub struct TranscriptCallbacks {
    on_partial: TextCallback,
    on_final: TextCallback,
    on_error: ErrorCallback,
}

impl Default for TranscriptCallbacks {
    fn default() -> Self {
        Self {
            on_partial: Box::new(|_| {}),
            on_final: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for TranscriptCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptCallbacks").finish_non_exhaustive()
    }
}

impl TranscriptCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_partial(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.on_partial = Box::new(f);
        self
    }

    pub fn on_final(mut self, f: impl Fn(&str) + Send + 'static) -> Self {
        self.on_final = Box::new(f);
        self
    }

    pub fn on_error(mut self, f: impl Fn(&SpeechError) + Send + 'static) -> Self {
        self.on_error = Box::new(f);
        self
    }
}

/// Callbacks of one session. The dispatcher holds this lock while invoking a
/// callback, so taking the value out waits for any in-flight call.
type SharedCallbacks = Arc<Mutex<Option<TranscriptCallbacks>>>;

thread_local! {
    /// Session whose callback is running on this thread.
    static IN_CALLBACK: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Marks the current thread as inside a callback of one session.
struct CallbackScope;

impl CallbackScope {
    fn enter(id: u64) -> Self {
        IN_CALLBACK.with(|c| c.set(Some(id)));
        CallbackScope
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        IN_CALLBACK.with(|c| c.set(None));
    }
}

fn in_callback_of(id: u64) -> bool {
    IN_CALLBACK.with(|c| c.get() == Some(id))
}

struct Session {
    id: u64,
    callbacks: SharedCallbacks,
    dispatcher: Option<JoinHandle<()>>,
}

struct CaptureInner {
    backend: Arc<dyn RecognitionBackend>,
    state: CaptureStateMachine,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
}

impl CaptureInner {
    fn is_current(&self, id: u64) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| s.id == id)
    }

    /// Tear down session `id` if it is still the active one.
    fn finish(&self, id: u64, cancelled: bool) {
        let session = {
            let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(s) if s.id == id => slot.take(),
                _ => None,
            }
        };
        let Some(mut session) = session else {
            return;
        };

        // From inside a callback the dispatcher holds the callbacks lock and
        // stops on its own once the callback returns.
        if !in_callback_of(id) {
            session
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
        self.backend.stop();
        if cancelled {
            if let Some(handle) = session.dispatcher.take() {
                handle.abort();
            }
        }
        self.state.reset();
        tracing::info!(session = id, cancelled, "Speech capture ended");
    }
}

/// Adapter over a `RecognitionBackend` that runs one session at a time.
///
/// Cloning shares the same backend and session slot.
#[derive(Clone)]
pub struct SpeechCapture {
    inner: Arc<CaptureInner>,
}

impl std::fmt::Debug for SpeechCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCapture")
            .field("backend", &self.inner.backend.name())
            .field("state", &self.inner.state.current())
            .finish()
    }
}

impl SpeechCapture {
    pub fn new(backend: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            inner: Arc::new(CaptureInner {
                backend,
                state: CaptureStateMachine::new(),
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.backend.is_available()
    }

    pub fn state(&self) -> CaptureState {
        self.inner.state.current()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == CaptureState::Listening
    }

    /// Start a capture session delivering transcripts to `callbacks`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin(&self, callbacks: TranscriptCallbacks) -> Result<CaptureSubscription, SpeechError> {
        if !self.inner.backend.is_available() {
            return Err(SpeechError::Unsupported);
        }

        let mut slot = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SpeechError::AlreadyActive);
        }
        self.inner.state.transition(CaptureState::Listening)?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.inner.backend.start(tx) {
            self.inner.state.reset();
            tracing::warn!(backend = self.inner.backend.name(), error = %e, "Speech capture failed to start");
            return Err(e);
        }

        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let callbacks: SharedCallbacks = Arc::new(Mutex::new(Some(callbacks)));
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&self.inner),
            id,
            Arc::clone(&callbacks),
            rx,
        ));
        *slot = Some(Session {
            id,
            callbacks,
            dispatcher: Some(dispatcher),
        });
        tracing::info!(session = id, backend = self.inner.backend.name(), "Speech capture started");

        Ok(CaptureSubscription {
            inner: Arc::clone(&self.inner),
            id,
            ended: false,
        })
    }

    /// End the active session, if any.
    pub fn end(&self) {
        let id = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.id);
        if let Some(id) = id {
            self.inner.finish(id, true);
        }
    }
}

/// Handle to a running capture session. Ending it (explicitly or by drop)
/// stops recognition; no callback fires once `end` returns.
#[must_use = "dropping the subscription ends the capture session"]
pub struct CaptureSubscription {
    inner: Arc<CaptureInner>,
    id: u64,
    ended: bool,
}

impl std::fmt::Debug for CaptureSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSubscription")
            .field("id", &self.id)
            .field("ended", &self.ended)
            .finish()
    }
}

impl CaptureSubscription {
    /// Whether this subscription's session is still the live one.
    pub fn is_active(&self) -> bool {
        !self.ended && self.inner.is_current(self.id)
    }

    pub fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            self.inner.finish(self.id, true);
        }
    }
}

impl Drop for CaptureSubscription {
    fn drop(&mut self) {
        self.end();
    }
}

fn invoke(id: u64, callbacks: &SharedCallbacks, f: impl FnOnce(&TranscriptCallbacks)) {
    let guard = callbacks.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(cb) = guard.as_ref() {
        let _scope = CallbackScope::enter(id);
        f(cb);
    }
}

async fn dispatch(
    inner: Arc<CaptureInner>,
    id: u64,
    callbacks: SharedCallbacks,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RecognitionEvent::Partial(text) => invoke(id, &callbacks, |cb| (cb.on_partial)(&text)),
            RecognitionEvent::Final(text) => invoke(id, &callbacks, |cb| (cb.on_final)(&text)),
            RecognitionEvent::Error(detail) => {
                tracing::warn!(session = id, error = %detail, "Speech recognition error");
                let err = SpeechError::Backend(detail);
                invoke(id, &callbacks, |cb| (cb.on_error)(&err));
                break;
            }
            RecognitionEvent::Ended => break,
        }
        if !inner.is_current(id) {
            // Ended by one of its own callbacks.
            callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return;
        }
    }
    inner.finish(id, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ScriptedBackend, UnsupportedBackend};
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording_callbacks(log: &Log) -> TranscriptCallbacks {
        let partial = Arc::clone(log);
        let fin = Arc::clone(log);
        let err = Arc::clone(log);
        TranscriptCallbacks::new()
            .on_partial(move |t| partial.lock().unwrap().push(format!("partial:{t}")))
            .on_final(move |t| fin.lock().unwrap().push(format!("final:{t}")))
            .on_error(move |e| err.lock().unwrap().push(format!("error:{e}")))
    }

    async fn wait_idle(capture: &SpeechCapture) {
        for _ in 0..200 {
            if capture.state() == CaptureState::Idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("capture never returned to idle");
    }

    #[tokio::test]
    async fn test_unsupported_begin_fails() {
        let capture = SpeechCapture::new(Arc::new(UnsupportedBackend));
        assert!(!capture.is_available());
        let result = capture.begin(TranscriptCallbacks::new());
        assert!(matches!(result, Err(SpeechError::Unsupported)));
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let backend = ScriptedBackend::new(vec![
            RecognitionEvent::Partial("hel".into()),
            RecognitionEvent::Final("hello".into()),
            RecognitionEvent::Ended,
        ]);
        let capture = SpeechCapture::new(Arc::new(backend));
        let log: Log = Arc::default();

        let sub = capture.begin(recording_callbacks(&log)).unwrap();
        assert_eq!(capture.state(), CaptureState::Listening);
        wait_idle(&capture).await;
        assert!(!sub.is_active());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["partial:hel".to_string(), "final:hello".to_string()]
        );
    }

    #[tokio::test]
    async fn test_second_begin_rejected() {
        let backend = ScriptedBackend::new(vec![RecognitionEvent::Partial("a".into())]);
        let capture = SpeechCapture::new(Arc::new(backend));

        let mut first = capture.begin(TranscriptCallbacks::new()).unwrap();
        let second = capture.begin(TranscriptCallbacks::new());
        assert!(matches!(second, Err(SpeechError::AlreadyActive)));
        assert!(first.is_active());

        first.end();
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_error_invokes_on_error_and_returns_idle() {
        let backend = ScriptedBackend::new(vec![
            RecognitionEvent::Partial("a".into()),
            RecognitionEvent::Error("no-speech".into()),
            RecognitionEvent::Final("never".into()),
        ]);
        let capture = SpeechCapture::new(Arc::new(backend));
        let log: Log = Arc::default();

        let _sub = capture.begin(recording_callbacks(&log)).unwrap();
        wait_idle(&capture).await;

        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "partial:a");
        assert!(log[1].starts_with("error:") && log[1].contains("no-speech"));
    }

    #[tokio::test]
    async fn test_no_callbacks_after_end() {
        let script = (0..50)
            .map(|i| RecognitionEvent::Partial(format!("p{i}")))
            .collect();
        let backend = ScriptedBackend::new(script).with_interval(Duration::from_millis(2));
        let capture = SpeechCapture::new(Arc::new(backend));
        let log: Log = Arc::default();

        let mut sub = capture.begin(recording_callbacks(&log)).unwrap();
        for _ in 0..200 {
            if !log.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        sub.end();
        let seen = log.lock().unwrap().len();
        assert!(seen > 0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(log.lock().unwrap().len(), seen);
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_callback_may_end_its_session() {
        let backend = ScriptedBackend::new(vec![
            RecognitionEvent::Final("one".into()),
            RecognitionEvent::Final("two".into()),
        ]);
        let capture = SpeechCapture::new(Arc::new(backend));
        let log: Log = Arc::default();

        let seen = Arc::clone(&log);
        let handle = capture.clone();
        let callbacks = TranscriptCallbacks::new().on_final(move |t| {
            seen.lock().unwrap().push(format!("final:{t}"));
            handle.end();
        });
        let sub = capture.begin(callbacks).unwrap();

        wait_idle(&capture).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*log.lock().unwrap(), vec!["final:one".to_string()]);
        assert!(!sub.is_active());

        // The slot is free for a new session.
        let next = capture.begin(TranscriptCallbacks::new()).unwrap();
        assert!(next.is_active());
    }

    #[tokio::test]
    async fn test_end_without_session_is_noop() {
        let capture = SpeechCapture::new(Arc::new(ScriptedBackend::new(vec![])));
        capture.end();
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_restart_after_end() {
        let backend = ScriptedBackend::new(vec![RecognitionEvent::Final("x".into())]);
        let capture = SpeechCapture::new(Arc::new(backend));

        let sub = capture.begin(TranscriptCallbacks::new()).unwrap();
        drop(sub);
        assert_eq!(capture.state(), CaptureState::Idle);

        let sub = capture.begin(TranscriptCallbacks::new()).unwrap();
        assert!(sub.is_active());
    }

    #[tokio::test]
    async fn test_stale_subscription_does_not_end_new_session() {
        let backend = ScriptedBackend::new(vec![RecognitionEvent::Final("x".into())]);
        let capture = SpeechCapture::new(Arc::new(backend));

        let mut old = capture.begin(TranscriptCallbacks::new()).unwrap();
        capture.end();
        let new = capture.begin(TranscriptCallbacks::new()).unwrap();

        old.end();
        assert!(new.is_active());
        assert_eq!(capture.state(), CaptureState::Listening);
    }
}
