use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ConversationPhase, Message, MessageFeedback};

/// State changes of the conversation log.
///
/// Emitted by the orchestrator after each mutation and consumed by the SSE
/// broadcast channel so a front end can re-render from the updated log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConversationEvent {
    /// A turn was appended to the log.
    MessageAppended { message: Message },

    /// Feedback was attached to an assistant turn.
    FeedbackRecorded {
        message_id: Uuid,
        feedback: MessageFeedback,
    },

    /// The log was cut back to `remaining` turns by a re-prompt.
    Truncated { remaining: usize, evicted: usize },

    /// The log was cleared.
    ConversationReset,

    /// The request lifecycle moved to a new phase.
    PhaseChanged { phase: ConversationPhase },
}

impl ConversationEvent {
    /// Short event name used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            ConversationEvent::MessageAppended { .. } => "message_appended",
            ConversationEvent::FeedbackRecorded { .. } => "feedback_recorded",
            ConversationEvent::Truncated { .. } => "truncated",
            ConversationEvent::ConversationReset => "conversation_reset",
            ConversationEvent::PhaseChanged { .. } => "phase_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedbackRating;

    #[test]
    fn test_event_tagged_serialization() {
        let event = ConversationEvent::PhaseChanged {
            phase: ConversationPhase::Sending,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["phase"], "sending");
    }

    #[test]
    fn test_event_names_match_tags() {
        let events = vec![
            ConversationEvent::MessageAppended {
                message: Message::user("hi", vec![]),
            },
            ConversationEvent::FeedbackRecorded {
                message_id: Uuid::new_v4(),
                feedback: MessageFeedback::new(FeedbackRating::Good),
            },
            ConversationEvent::Truncated {
                remaining: 1,
                evicted: 3,
            },
            ConversationEvent::ConversationReset,
            ConversationEvent::PhaseChanged {
                phase: ConversationPhase::Idle,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }
}
