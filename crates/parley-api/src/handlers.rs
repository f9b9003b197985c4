//! Route handler functions for all API endpoints.
//!
//! Handlers never hold the draft lock across an await: a send accepts the
//! draft under the lock, drops it, then waits for the reply. Replies run on
//! their own task so a client disconnect does not abandon them.

use std::convert::Infallible;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use parley_attachments::FileInput;
use parley_chat::{Composer, TurnOutcome};
use parley_core::types::{
    Attachment, ChatConfig, ChatMode, ConversationPhase, ConversationSummary, FeedbackRating,
    Message, MessageFeedback,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the original file name of an upload.
pub const FILE_NAME_HEADER: &str = "x-file-name";

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    /// Replaces the draft text before sending. Omit to send the draft as-is.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: FeedbackRating,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub corrected_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepromptRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DraftUpdate {
    pub text: String,
}

/// Partial settings update. Absent fields keep their current value, and so
/// does a credential equal to its masked form.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub mode: Option<ChatMode>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub enable_voice: Option<bool>,
    pub enable_annotations: Option<bool>,
    pub credential: Option<String>,
}

impl SettingsPatch {
    fn apply(self, config: &mut ChatConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(enable_voice) = self.enable_voice {
            config.enable_voice = enable_voice;
        }
        if let Some(enable_annotations) = self.enable_annotations {
            config.enable_annotations = enable_annotations;
        }
        if let Some(credential) = self.credential {
            let credential = credential.trim();
            if credential != config.masked_credential() {
                config.credential = credential.to_string();
            }
        }
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub message_count: usize,
    pub busy: bool,
    pub provider_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub messages: Vec<Message>,
    pub phase: ConversationPhase,
    pub summary: ConversationSummary,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub user_message: Message,
    /// Absent when the conversation was reset before the reply arrived.
    pub reply: Option<Message>,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            user_message: outcome.user_message,
            reply: outcome.reply,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    pub text: String,
    pub partial: String,
    pub display_text: String,
    pub attachments: Vec<Attachment>,
    pub dictating: bool,
    pub speech_available: bool,
    pub last_speech_error: Option<String>,
}

impl DraftResponse {
    fn from_composer(composer: &Composer, speech_available: bool) -> Self {
        Self {
            text: composer.text(),
            partial: composer.partial(),
            display_text: composer.display_text(),
            attachments: composer.attachments().to_vec(),
            dictating: composer.is_dictating(),
            speech_available,
            last_speech_error: composer.last_speech_error().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttachmentsResponse {
    pub attachments: Vec<Attachment>,
}

/// Chat settings as shown to the front end: the credential is masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub config: ChatConfig,
    pub credential_set: bool,
    pub configured: bool,
}

impl SettingsResponse {
    fn new(config: ChatConfig, configured: bool) -> Self {
        let credential_set = !config.credential.is_empty();
        let masked = config.masked_credential();
        Self {
            config: ChatConfig {
                credential: masked,
                ..config
            },
            credential_set,
            configured,
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn lock_composer(state: &AppState) -> Result<MutexGuard<'_, Composer>, ApiError> {
    state
        .composer
        .lock()
        .map_err(|e| ApiError::Internal(format!("Draft lock poisoned: {}", e)))
}

fn conversation_response(state: &AppState) -> Result<ConversationResponse, ApiError> {
    Ok(ConversationResponse {
        messages: state.orchestrator.messages()?,
        phase: state.orchestrator.phase(),
        summary: state.orchestrator.summary()?,
    })
}

fn settings_response(state: &AppState, config: ChatConfig) -> SettingsResponse {
    SettingsResponse::new(config, state.orchestrator.is_configured())
}

// =============================================================================
// Health and conversation
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        message_count: state.orchestrator.messages()?.len(),
        busy: state.orchestrator.is_busy(),
        provider_configured: state.orchestrator.is_configured(),
    }))
}

/// GET /conversation - the full log with phase and summary.
pub async fn get_conversation(
    State(state): State<AppState>,
) -> Result<Json<ConversationResponse>, ApiError> {
    Ok(Json(conversation_response(&state)?))
}

/// DELETE /conversation - start a new conversation.
pub async fn reset_conversation(
    State(state): State<AppState>,
) -> Result<Json<ConversationResponse>, ApiError> {
    state.orchestrator.reset_conversation()?;
    Ok(Json(conversation_response(&state)?))
}

/// POST /conversation/messages - send the draft and wait for the reply.
pub async fn send_message(
    State(state): State<AppState>,
    body: Option<Json<SendMessageRequest>>,
) -> Result<Json<TurnResponse>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let pending = {
        let mut composer = lock_composer(&state)?;
        if let Some(content) = request.content {
            composer.set_text(content);
        }
        state.orchestrator.begin_draft(&mut composer)?
    };
    tracing::debug!(message_id = %pending.user_message().id, "Awaiting reply");
    let orchestrator = Arc::clone(&state.orchestrator);
    let outcome = tokio::spawn(async move { orchestrator.finish_turn(pending).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Reply task failed: {}", e)))?;
    Ok(Json(outcome.into()))
}

/// POST /conversation/messages/{id}/feedback - rate an assistant turn.
pub async fn record_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<Message>, ApiError> {
    let mut feedback = MessageFeedback::new(body.rating);
    if let Some(annotation) = body.annotation {
        feedback = feedback.with_annotation(annotation);
    }
    if let Some(corrected) = body.corrected_content {
        feedback = feedback.with_corrected_content(corrected);
    }
    let message = state.orchestrator.record_feedback(id, feedback)?;
    Ok(Json(message))
}

/// POST /conversation/messages/{id}/reprompt - replace a message and everything after it.
pub async fn reprompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RepromptRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let outcome = tokio::spawn(async move { orchestrator.reprompt(id, &body.content).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Reply task failed: {}", e)))??;
    match outcome {
        Some(outcome) => Ok(Json(outcome.into())),
        None => Err(ApiError::NotFound(format!("No message with id {}", id))),
    }
}

// =============================================================================
// Draft and dictation
// =============================================================================

/// GET /draft - current composition buffer.
pub async fn get_draft(State(state): State<AppState>) -> Result<Json<DraftResponse>, ApiError> {
    let composer = lock_composer(&state)?;
    Ok(Json(DraftResponse::from_composer(
        &composer,
        state.speech.is_available(),
    )))
}

/// PUT /draft - replace the draft text.
pub async fn update_draft(
    State(state): State<AppState>,
    Json(body): Json<DraftUpdate>,
) -> Result<Json<DraftResponse>, ApiError> {
    let mut composer = lock_composer(&state)?;
    composer.set_text(body.text);
    Ok(Json(DraftResponse::from_composer(
        &composer,
        state.speech.is_available(),
    )))
}

/// DELETE /draft - clear the text and release pending attachments.
pub async fn discard_draft(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    lock_composer(&state)?.discard();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /draft/dictation/start - dictate into the draft.
pub async fn dictation_start(
    State(state): State<AppState>,
) -> Result<Json<DraftResponse>, ApiError> {
    let enable_voice = state.orchestrator.settings().enable_voice;
    let mut composer = lock_composer(&state)?;
    composer.start_dictation(&state.speech, enable_voice)?;
    tracing::info!("Dictation started");
    Ok(Json(DraftResponse::from_composer(
        &composer,
        state.speech.is_available(),
    )))
}

/// POST /draft/dictation/stop - stop dictating. Stopping an idle session is a no-op.
pub async fn dictation_stop(
    State(state): State<AppState>,
) -> Result<Json<DraftResponse>, ApiError> {
    let mut composer = lock_composer(&state)?;
    composer.stop_dictation();
    Ok(Json(DraftResponse::from_composer(
        &composer,
        state.speech.is_available(),
    )))
}

// =============================================================================
// Attachments
// =============================================================================

/// GET /attachments - attachments pending on the draft.
pub async fn list_attachments(
    State(state): State<AppState>,
) -> Result<Json<AttachmentsResponse>, ApiError> {
    let composer = lock_composer(&state)?;
    Ok(Json(AttachmentsResponse {
        attachments: composer.attachments().to_vec(),
    }))
}

/// POST /attachments - add the raw request body to the draft.
pub async fn upload_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Attachment>), ApiError> {
    let name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Missing {} header", FILE_NAME_HEADER))
        })?
        .to_string();
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let file = FileInput::new(name, mime_type, body.to_vec());
    let mut added = lock_composer(&state)?.attach(vec![file])?;
    let attachment = added
        .pop()
        .ok_or_else(|| ApiError::Internal("Upload produced no attachment".to_string()))?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

/// DELETE /attachments/{id} - remove a pending attachment.
pub async fn remove_attachment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if lock_composer(&state)?.remove_attachment(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No pending attachment with id {}", id)))
    }
}

/// GET /attachments/{id}/content - bytes of a pending or sent attachment.
pub async fn attachment_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let pending = lock_composer(&state)?.attachment(id).cloned();
    let attachment = match pending {
        Some(a) => a,
        None => state
            .orchestrator
            .find_attachment(id)?
            .ok_or_else(|| ApiError::NotFound(format!("No attachment with id {}", id)))?,
    };
    let bytes = state.orchestrator.locators().read(&attachment.locator)?;
    Ok((
        [(header::CONTENT_TYPE, attachment.mime_type)],
        bytes.to_vec(),
    ))
}

// =============================================================================
// Settings
// =============================================================================

/// GET /settings - chat settings with the credential masked.
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(settings_response(&state, state.orchestrator.settings()))
}

/// PUT /settings - apply a partial update.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let mut next = state.orchestrator.settings();
    patch.apply(&mut next);
    let applied = state.orchestrator.apply_settings(next)?;
    Ok(Json(settings_response(&state, applied)))
}

/// POST /settings/reset - restore defaults.
pub async fn reset_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let defaults = state.orchestrator.reset_settings();
    Json(settings_response(&state, defaults))
}

// =============================================================================
// Stream
// =============================================================================

/// GET /stream - SSE of conversation events.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.orchestrator.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.name()).data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
