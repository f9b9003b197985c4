//! Conversation orchestrator: owns the message log and the request lifecycle.
//!
//! A submission is accepted synchronously (`begin_turn`): the user turn is
//! appended and the phase moves to Sending under one lock, before any await.
//! The completion call then runs without the lock (`finish_turn`) and its
//! outcome is appended as one assistant turn. A pending turn dropped before
//! it finishes settles the conversation with an error turn.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use uuid::Uuid;

use parley_attachments::LocatorStore;
use parley_completion::{AttachmentPayload, CompletionClient, CompletionRequest};
use parley_core::events::ConversationEvent;
use parley_core::types::{
    Attachment, ChatConfig, ConversationPhase, ConversationSummary, Message, MessageFeedback,
};

use crate::composer::Composer;
use crate::error::ChatError;
use crate::settings::SettingsStore;

/// Longest sidebar title, in characters.
const TITLE_MAX_CHARS: usize = 40;

/// Title of a conversation without user turns.
const UNTITLED: &str = "New Chat";

const EVENT_CAPACITY: usize = 256;

/// Error turn appended when an accepted turn is abandoned mid-flight.
pub const CANCELLED_REPLY: &str = "The request was cancelled before a reply arrived.";

type SharedState = Arc<Mutex<ConversationState>>;

/// Result of an accepted submission.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: Message,
    /// `None` when a reset discarded the reply.
    pub reply: Option<Message>,
}

/// An accepted submission whose completion has not run yet.
#[derive(Debug)]
#[must_use = "an accepted turn keeps the conversation busy until finished"]
pub struct PendingTurn {
    user_message: Message,
    history: Vec<Message>,
    payloads: Vec<AttachmentPayload>,
    config: ChatConfig,
    generation: u64,
    state: SharedState,
    events: broadcast::Sender<ConversationEvent>,
    settled: bool,
}

impl PendingTurn {
    pub fn user_message(&self) -> &Message {
        &self.user_message
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            set_phase(&self.events, &mut state, ConversationPhase::Idle);
            return;
        }
        tracing::warn!(
            message_id = %self.user_message.id,
            "Turn abandoned before its reply arrived"
        );
        let reply = Message::error(CANCELLED_REPLY);
        state.messages.push(reply.clone());
        emit(&self.events, ConversationEvent::MessageAppended { message: reply });
        set_phase(&self.events, &mut state, ConversationPhase::Failed);
    }
}

#[derive(Debug, Default)]
struct ConversationState {
    messages: Vec<Message>,
    phase: ConversationPhase,
    /// Bumped on every reset; replies from older generations are discarded.
    generation: u64,
}

/// A submission rejected before it touched the log. Hands the attachments
/// back so the caller decides who releases them.
struct Rejected {
    error: ChatError,
    attachments: Vec<Attachment>,
}

fn emit(events: &broadcast::Sender<ConversationEvent>, event: ConversationEvent) {
    // No subscribers is fine.
    let _ = events.send(event);
}

fn set_phase(
    events: &broadcast::Sender<ConversationEvent>,
    state: &mut ConversationState,
    target: ConversationPhase,
) {
    if state.phase == target {
        return;
    }
    if !state.phase.can_transition_to(&target) {
        tracing::warn!(from = %state.phase, to = %target, "Unexpected conversation phase change");
    }
    state.phase = target;
    emit(events, ConversationEvent::PhaseChanged { phase: target });
}

/// Coordinates the log, the completion client, settings and locators.
pub struct ConversationOrchestrator {
    client: Arc<dyn CompletionClient>,
    settings: Arc<SettingsStore>,
    locators: Arc<LocatorStore>,
    state: SharedState,
    events: broadcast::Sender<ConversationEvent>,
}

impl ConversationOrchestrator {
    /// Create an orchestrator and configure `client` with the stored credential.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        settings: Arc<SettingsStore>,
        locators: Arc<LocatorStore>,
    ) -> Self {
        let configured = client.configure(&settings.current().credential);
        tracing::info!(
            provider = client.name(),
            configured,
            "Conversation orchestrator ready"
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            settings,
            locators,
            state: Arc::new(Mutex::new(ConversationState::default())),
            events,
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ConversationState>, ChatError> {
        self.state
            .lock()
            .map_err(|e| ChatError::StateUnavailable(format!("conversation lock poisoned: {}", e)))
    }

    fn emit(&self, event: ConversationEvent) {
        emit(&self.events, event);
    }

    fn set_phase(&self, state: &mut ConversationState, target: ConversationPhase) {
        set_phase(&self.events, state, target);
    }

    // =========================================================================
    // Submissions
    // =========================================================================

    /// Submit a user turn and wait for its reply.
    ///
    /// Ownership of `attachments` passes in: on rejection their locators
    /// are released.
    pub async fn submit_user_turn(
        &self,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<TurnOutcome, ChatError> {
        let pending = self.begin_turn(content, attachments)?;
        Ok(self.finish_turn(pending).await)
    }

    /// Accept a user turn without waiting for the reply.
    pub fn begin_turn(
        &self,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<PendingTurn, ChatError> {
        let accepted = match self.lock_state() {
            Ok(mut state) => self.accept(&mut state, content, attachments),
            Err(error) => Err(Rejected { error, attachments }),
        };

        accepted.map_err(|rejected| {
            let released = self.locators.release_all(&rejected.attachments);
            if released > 0 {
                tracing::debug!(released, "Released attachments of rejected submission");
            }
            rejected.error
        })
    }

    /// Submit the composer's draft and wait for the reply.
    pub async fn submit_draft(&self, composer: &mut Composer) -> Result<TurnOutcome, ChatError> {
        let pending = self.begin_draft(composer)?;
        Ok(self.finish_turn(pending).await)
    }

    /// Accept the composer's draft. On rejection the draft is left untouched;
    /// on acceptance it is cleared and its attachments belong to the new turn.
    pub fn begin_draft(&self, composer: &mut Composer) -> Result<PendingTurn, ChatError> {
        let (text, attachments) = composer.submission();
        let mut state = self.lock_state()?;
        let pending = self
            .accept(&mut state, &text, attachments)
            .map_err(|rejected| rejected.error)?;
        drop(state);
        composer.mark_sent();
        Ok(pending)
    }

    /// Validate and append a user turn. Caller holds the state lock.
    fn accept(
        &self,
        state: &mut ConversationState,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<PendingTurn, Rejected> {
        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return Err(Rejected {
                error: ChatError::EmptySubmission,
                attachments,
            });
        }
        if !state.phase.accepts_submissions() {
            return Err(Rejected {
                error: ChatError::Busy,
                attachments,
            });
        }

        let payloads = attachments
            .iter()
            .map(|a| {
                let content = match self.locators.read(&a.locator) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(attachment_id = %a.id, error = %e, "Attachment content unavailable");
                        None
                    }
                };
                AttachmentPayload::new(a.clone(), content)
            })
            .collect();

        let user_message = Message::user(content, attachments);
        state.messages.push(user_message.clone());
        self.emit(ConversationEvent::MessageAppended {
            message: user_message.clone(),
        });
        self.set_phase(state, ConversationPhase::Sending);

        let history = state
            .messages
            .iter()
            .filter(|m| !m.is_error)
            .cloned()
            .collect();

        tracing::info!(
            message_id = %user_message.id,
            attachments = user_message.attachments.len(),
            "User turn accepted"
        );

        Ok(PendingTurn {
            user_message,
            history,
            payloads,
            config: self.settings.current(),
            generation: state.generation,
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            settled: false,
        })
    }

    /// Run the completion for an accepted turn and append its reply.
    ///
    /// Never fails: provider errors become an error turn. The phase leaves
    /// Sending on every path, including when this future is dropped early.
    pub async fn finish_turn(&self, mut pending: PendingTurn) -> TurnOutcome {
        let request = CompletionRequest::new(&pending.history, &pending.config, &pending.payloads);
        let result = self.client.complete(request).await;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        pending.settled = true;
        let user_message = pending.user_message.clone();

        if state.generation != pending.generation {
            tracing::debug!(
                message_id = %pending.user_message.id,
                "Discarding reply for a conversation that was reset"
            );
            self.set_phase(&mut state, ConversationPhase::Idle);
            return TurnOutcome {
                user_message,
                reply: None,
            };
        }

        let (reply, phase) = match result {
            Ok(text) => (Message::assistant(text), ConversationPhase::Idle),
            Err(e) => {
                tracing::warn!(
                    message_id = %pending.user_message.id,
                    provider = self.client.name(),
                    error = %e,
                    "Completion failed"
                );
                (Message::error(e.user_message()), ConversationPhase::Failed)
            }
        };

        state.messages.push(reply.clone());
        self.emit(ConversationEvent::MessageAppended {
            message: reply.clone(),
        });
        self.set_phase(&mut state, phase);

        TurnOutcome {
            user_message,
            reply: Some(reply),
        }
    }

    // =========================================================================
    // Log edits
    // =========================================================================

    /// Attach feedback to an assistant turn. Feedback is recorded once.
    pub fn record_feedback(
        &self,
        message_id: Uuid,
        feedback: MessageFeedback,
    ) -> Result<Message, ChatError> {
        let mut state = self.lock_state()?;
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(ChatError::MessageNotFound(message_id))?;
        if message.is_user() {
            return Err(ChatError::FeedbackOnUserTurn(message_id));
        }
        if message.feedback.is_some() {
            return Err(ChatError::AlreadyRated(message_id));
        }

        let feedback = feedback.normalized();
        message.feedback = Some(feedback.clone());
        let updated = message.clone();
        tracing::info!(message_id = %message_id, rating = ?feedback.rating, "Feedback recorded");
        self.emit(ConversationEvent::FeedbackRecorded {
            message_id,
            feedback,
        });
        Ok(updated)
    }

    /// Replace the log from `message_id` onward with a new user turn.
    ///
    /// Returns `Ok(None)` if no such message is in the log. Every evicted
    /// turn's attachments are released.
    pub async fn reprompt(
        &self,
        message_id: Uuid,
        new_content: &str,
    ) -> Result<Option<TurnOutcome>, ChatError> {
        let pending = {
            let mut state = self.lock_state()?;
            if !state.phase.accepts_submissions() {
                return Err(ChatError::Busy);
            }
            let Some(index) = state.messages.iter().position(|m| m.id == message_id) else {
                return Ok(None);
            };
            if new_content.trim().is_empty() {
                return Err(ChatError::EmptySubmission);
            }

            let evicted = state.messages.split_off(index);
            let released: usize = evicted
                .iter()
                .map(|m| self.locators.release_all(&m.attachments))
                .sum();
            tracing::info!(
                message_id = %message_id,
                evicted = evicted.len(),
                released,
                "Conversation truncated for re-prompt"
            );
            self.emit(ConversationEvent::Truncated {
                remaining: state.messages.len(),
                evicted: evicted.len(),
            });

            self.accept(&mut state, new_content, Vec::new())
                .map_err(|rejected| rejected.error)?
        };
        Ok(Some(self.finish_turn(pending).await))
    }

    /// Clear the log and release every attachment it owned.
    ///
    /// A reply still in flight is discarded when it arrives.
    pub fn reset_conversation(&self) -> Result<(), ChatError> {
        let mut state = self.lock_state()?;
        let cleared = std::mem::take(&mut state.messages);
        let released: usize = cleared
            .iter()
            .map(|m| self.locators.release_all(&m.attachments))
            .sum();
        state.generation += 1;
        tracing::info!(
            cleared = cleared.len(),
            released,
            in_flight = state.phase == ConversationPhase::Sending,
            "Conversation reset"
        );
        self.emit(ConversationEvent::ConversationReset);
        if state.phase == ConversationPhase::Failed {
            self.set_phase(&mut state, ConversationPhase::Idle);
        }
        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Validate and persist new settings, then reconfigure the client.
    pub fn apply_settings(&self, config: ChatConfig) -> Result<ChatConfig, ChatError> {
        let stored = self.settings.replace(config)?;
        let configured = self.client.configure(&stored.credential);
        tracing::debug!(configured, "Completion client reconfigured");
        Ok(stored)
    }

    /// Restore default settings and clear the client credential.
    pub fn reset_settings(&self) -> ChatConfig {
        let defaults = self.settings.reset();
        self.client.configure(&defaults.credential);
        defaults
    }

    pub fn settings(&self) -> ChatConfig {
        self.settings.current()
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn messages(&self) -> Result<Vec<Message>, ChatError> {
        Ok(self.lock_state()?.messages.clone())
    }

    pub fn message(&self, message_id: Uuid) -> Result<Option<Message>, ChatError> {
        Ok(self
            .lock_state()?
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    /// Find an attachment on any turn currently in the log.
    pub fn find_attachment(&self, attachment_id: Uuid) -> Result<Option<Attachment>, ChatError> {
        Ok(self
            .lock_state()?
            .messages
            .iter()
            .flat_map(|m| m.attachments.iter())
            .find(|a| a.id == attachment_id)
            .cloned())
    }

    pub fn phase(&self) -> ConversationPhase {
        self.state
            .lock()
            .map(|s| s.phase)
            .unwrap_or(ConversationPhase::Idle)
    }

    pub fn is_busy(&self) -> bool {
        self.phase() == ConversationPhase::Sending
    }

    /// Title, message count and last activity of the conversation.
    pub fn summary(&self) -> Result<ConversationSummary, ChatError> {
        let state = self.lock_state()?;
        let title = state
            .messages
            .iter()
            .find(|m| m.is_user() && !m.content.is_empty())
            .map(|m| truncate_title(&m.content))
            .unwrap_or_else(|| UNTITLED.to_string());
        Ok(ConversationSummary {
            title,
            message_count: state.messages.len(),
            last_activity: state.messages.last().map(|m| m.created_at),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn locators(&self) -> &Arc<LocatorStore> {
        &self.locators
    }
}

fn truncate_title(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() <= TITLE_MAX_CHARS {
        content.to_string()
    } else {
        let head: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head.trim_end())
    }
}

// =============================================================================
// Tests
// =============================================================================
