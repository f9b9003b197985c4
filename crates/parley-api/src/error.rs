//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same `{error, message}` body and maps
//! conversation rejections onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use parley_attachments::AttachmentError;
use parley_chat::ChatError;
use parley_speech::SpeechError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - a reply is pending or the resource is already in that state.
    Conflict(String),
    /// 422 Unprocessable Entity - valid syntax but rejected by validation.
    UnprocessableEntity(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 503 Service Unavailable - capability missing on this host.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptySubmission
            | ChatError::FeedbackOnUserTurn(_)
            | ChatError::VoiceDisabled
            | ChatError::Settings(_) => ApiError::UnprocessableEntity(message),
            ChatError::Busy | ChatError::AlreadyRated(_) => ApiError::Conflict(message),
            ChatError::MessageNotFound(_) => ApiError::NotFound(message),
            ChatError::Speech(SpeechError::Unsupported) => ApiError::ServiceUnavailable(message),
            ChatError::Speech(SpeechError::AlreadyActive) => ApiError::Conflict(message),
            ChatError::Attachment(AttachmentError::LocatorNotFound(_)) => {
                ApiError::NotFound(message)
            }
            ChatError::Speech(SpeechError::Backend(_))
            | ChatError::Attachment(_)
            | ChatError::StateUnavailable(_) => ApiError::Internal(message),
        }
    }
}

impl From<AttachmentError> for ApiError {
    fn from(err: AttachmentError) -> Self {
        ChatError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: ChatError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_chat_error_status_mapping() {
        assert_eq!(status_of(ChatError::EmptySubmission), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(ChatError::Busy), StatusCode::CONFLICT);
        assert_eq!(status_of(ChatError::MessageNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ChatError::AlreadyRated(Uuid::nil())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ChatError::FeedbackOnUserTurn(Uuid::nil())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(ChatError::Speech(SpeechError::Unsupported)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ChatError::StateUnavailable("poisoned".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
