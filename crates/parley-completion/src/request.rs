//! Chat-completions wire format and request building.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use parley_core::types::{Attachment, AttachmentKind, Message};

use crate::client::{AttachmentPayload, CompletionRequest};

/// Reply used when the provider returns no usable content.
pub const EMPTY_REPLY: &str = "No response received";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireContent,
}

/// Plain text, or a list of typed parts for a turn with attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Error body returned by OpenAI-compatible APIs.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

// =============================================================================
// Building
// =============================================================================

/// Build the provider request body for `request`.
///
/// Error turns are dropped. The newest user turn carries the attachments;
/// every other turn is sent as plain text.
pub fn build_request(request: &CompletionRequest<'_>) -> ChatCompletionRequest {
    let history: Vec<&Message> = request.history.iter().filter(|m| !m.is_error).collect();
    let carrier = history.iter().rposition(|m| m.is_user());

    let messages = history
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let content = if Some(i) == carrier && !request.attachments.is_empty() {
                WireContent::Parts(content_parts(&m.content, request.attachments))
            } else {
                WireContent::Text(m.content.clone())
            };
            WireMessage {
                role: m.role.to_string(),
                content,
            }
        })
        .collect();

    ChatCompletionRequest {
        model: request.config.model.clone(),
        messages,
        temperature: request.config.temperature,
        max_tokens: request.config.max_tokens,
    }
}

fn content_parts(text: &str, attachments: &[AttachmentPayload]) -> Vec<ContentPart> {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.is_empty() {
        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
    }
    parts.extend(attachments.iter().map(attachment_part));
    parts
}

fn attachment_part(payload: &AttachmentPayload) -> ContentPart {
    let attachment = &payload.attachment;
    match (attachment.kind, payload.content.as_deref()) {
        (AttachmentKind::Image, Some(bytes)) => ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!(
                    "data:{};base64,{}",
                    attachment.mime_type,
                    STANDARD.encode(bytes)
                ),
            },
        },
        (AttachmentKind::Text, Some(bytes)) => match std::str::from_utf8(bytes) {
            Ok(content) => ContentPart::Text {
                text: format!(
                    "--- File: {name} ---\n{content}\n--- End of {name} ---",
                    name = attachment.name
                ),
            },
            Err(_) => ContentPart::Text {
                text: describe(attachment, true),
            },
        },
        (AttachmentKind::Image | AttachmentKind::Text, None) => ContentPart::Text {
            text: describe(attachment, true),
        },
        _ => ContentPart::Text {
            text: describe(attachment, false),
        },
    }
}

/// Textual stand-in for an attachment whose content is not inlined.
fn describe(attachment: &Attachment, unavailable: bool) -> String {
    let size = attachment.display_size();
    let size = if size.is_empty() {
        String::new()
    } else {
        format!(" ({})", size)
    };
    let suffix = if unavailable {
        " (content unavailable)"
    } else {
        ""
    };
    format!(
        "[Attached {} file: {}{}{}]",
        attachment.kind, attachment.name, size, suffix
    )
}

/// First choice's content, or [`EMPTY_REPLY`] when absent or empty.
pub fn extract_reply(response: ChatCompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| EMPTY_REPLY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{ChatConfig, Locator};
    use std::sync::Arc;
    use uuid::Uuid;

    fn attachment(kind: AttachmentKind, name: &str, mime: &str, size: Option<u64>) -> Attachment {
        Attachment {
            id: Uuid::new_v4(),
            kind,
            name: name.to_string(),
            mime_type: mime.to_string(),
            locator: Locator::new(),
            size_bytes: size,
        }
    }

    fn with_bytes(a: Attachment, bytes: &[u8]) -> AttachmentPayload {
        AttachmentPayload::new(a, Some(Arc::from(bytes)))
    }

    fn unreadable(a: Attachment) -> AttachmentPayload {
        AttachmentPayload::new(a, None)
    }

    fn parts_of(body: &ChatCompletionRequest) -> &[ContentPart] {
        match &body.messages.last().unwrap().content {
            WireContent::Parts(parts) => parts,
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_history_skips_error_turns() {
        let config = ChatConfig::default();
        let history = vec![
            Message::user("hi", vec![]),
            Message::error("The provider's rate limit was exceeded."),
            Message::user("again", vec![]),
            Message::assistant("hello"),
            Message::user("how are you", vec![]),
        ];
        let body = build_request(&CompletionRequest::new(&history, &config, &[]));

        assert_eq!(body.model, "gpt-4o-mini");
        assert_eq!(body.max_tokens, 1000);
        assert_eq!(body.messages.len(), 4);
        let roles: Vec<_> = body.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "user", "assistant", "user"]);
        assert_eq!(
            body.messages[3].content,
            WireContent::Text("how are you".to_string())
        );
    }

    #[test]
    fn test_image_becomes_data_url_after_text() {
        let config = ChatConfig::default();
        let history = vec![Message::user("what is this?", vec![])];
        let image = with_bytes(
            attachment(AttachmentKind::Image, "cat.png", "image/png", Some(3)),
            &[1, 2, 3],
        );
        let body = build_request(&CompletionRequest::new(&history, &config, &[image]));
        let parts = parts_of(&body);

        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: "what is this?".to_string()
            }
        );
        assert_eq!(
            parts[1],
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AQID".to_string()
                }
            }
        );
    }

    #[test]
    fn test_image_part_wire_shape() {
        let part = ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/png;base64,AA==".to_string(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "data:image/png;base64,AA==");
    }

    #[test]
    fn test_text_file_inlined_with_delimiters() {
        let config = ChatConfig::default();
        let history = vec![Message::user("", vec![])];
        let notes = with_bytes(
            attachment(AttachmentKind::Text, "notes.md", "text/markdown", Some(5)),
            b"# Hi!",
        );
        let body = build_request(&CompletionRequest::new(&history, &config, &[notes]));
        let parts = parts_of(&body);

        // Empty user text is omitted.
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: "--- File: notes.md ---\n# Hi!\n--- End of notes.md ---".to_string()
            }
        );
    }

    #[test]
    fn test_unreadable_and_binary_described() {
        let config = ChatConfig::default();
        let history = vec![Message::user("see files", vec![])];
        let attachments = vec![
            unreadable(attachment(AttachmentKind::Text, "gone.txt", "text/plain", Some(2048))),
            with_bytes(
                attachment(AttachmentKind::Text, "latin1.txt", "text/plain", None),
                &[0xff, 0xfe, 0x00],
            ),
            with_bytes(
                attachment(AttachmentKind::Data, "bundle.zip", "application/zip", Some(1536)),
                &[1, 2],
            ),
            with_bytes(
                attachment(AttachmentKind::Audio, "memo.mp3", "audio/mpeg", None),
                &[1],
            ),
        ];
        let body = build_request(&CompletionRequest::new(&history, &config, &attachments));
        let texts: Vec<_> = parts_of(&body)
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.as_str(),
                ContentPart::ImageUrl { .. } => panic!("unexpected image part"),
            })
            .collect();

        assert_eq!(
            texts,
            vec![
                "see files",
                "[Attached text file: gone.txt (2.0 KB) (content unavailable)]",
                "[Attached text file: latin1.txt (content unavailable)]",
                "[Attached data file: bundle.zip (1.5 KB)]",
                "[Attached audio file: memo.mp3]",
            ]
        );
    }

    #[test]
    fn test_only_newest_user_turn_carries_attachments() {
        let config = ChatConfig::default();
        let history = vec![
            Message::user("first", vec![]),
            Message::assistant("reply"),
            Message::user("second", vec![]),
        ];
        let image = with_bytes(
            attachment(AttachmentKind::Image, "a.png", "image/png", Some(1)),
            &[0],
        );
        let body = build_request(&CompletionRequest::new(&history, &config, &[image]));
        assert_eq!(body.messages[0].content, WireContent::Text("first".into()));
        assert_eq!(body.messages[1].content, WireContent::Text("reply".into()));
        assert!(matches!(body.messages[2].content, WireContent::Parts(_)));
    }

    #[test]
    fn test_extract_reply_fallback() {
        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(extract_reply(empty), EMPTY_REPLY);

        let blank: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap();
        assert_eq!(extract_reply(blank), EMPTY_REPLY);

        let null: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(extract_reply(null), EMPTY_REPLY);

        let ok: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_reply(ok), "Hello!");
    }

    #[test]
    fn test_plain_content_serializes_as_string() {
        let msg = WireMessage {
            role: "user".to_string(),
            content: WireContent::Text("hi".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "hi");
    }
}
