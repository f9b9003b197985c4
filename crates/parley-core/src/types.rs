use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParleyError, Result};

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversational turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Kind of a user-supplied file, derived from its MIME type or extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Text,
    /// Fallback for anything unrecognized (binary data).
    Data,
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Video => "video",
            AttachmentKind::Audio => "audio",
            AttachmentKind::Text => "text",
            AttachmentKind::Data => "data",
        };
        f.write_str(name)
    }
}

/// Rating a user gives an assistant turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Good,
    Bad,
}

/// UI mode. Gates which controls the front end shows; the orchestrator
/// ignores it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    Basic,
    Advanced,
}

/// Request lifecycle of the conversation.
///
/// - Idle -> Sending (submission accepted)
/// - Failed -> Sending (submission accepted after an error turn)
/// - Sending -> Idle (reply appended)
/// - Sending -> Failed (error turn appended)
/// - Failed -> Idle (conversation reset)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    Idle,
    Sending,
    /// Idle, but the most recent turn was an error.
    Failed,
}

impl fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationPhase::Idle => write!(f, "Idle"),
            ConversationPhase::Sending => write!(f, "Sending"),
            ConversationPhase::Failed => write!(f, "Failed"),
        }
    }
}

impl ConversationPhase {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &ConversationPhase) -> bool {
        matches!(
            (self, target),
            (ConversationPhase::Idle, ConversationPhase::Sending)
                | (ConversationPhase::Failed, ConversationPhase::Sending)
                | (ConversationPhase::Sending, ConversationPhase::Idle)
                | (ConversationPhase::Sending, ConversationPhase::Failed)
                | (ConversationPhase::Failed, ConversationPhase::Idle)
        )
    }

    /// Whether a new submission may start from this phase.
    pub fn accepts_submissions(&self) -> bool {
        !matches!(self, ConversationPhase::Sending)
    }
}

// =============================================================================
// Attachments
// =============================================================================

/// Opaque handle to attachment bytes held by a locator store.
///
/// Serialized as `blob:<uuid>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Locator(Uuid);

impl Locator {
    /// Allocate a fresh, unique locator.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:{}", self.0)
    }
}

impl FromStr for Locator {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s
            .strip_prefix("blob:")
            .ok_or_else(|| ParleyError::Attachment(format!("invalid locator: {}", s)))?;
        Uuid::parse_str(raw)
            .map(Locator)
            .map_err(|e| ParleyError::Attachment(format!("invalid locator {}: {}", s, e)))
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

impl TryFrom<String> for Locator {
    type Error = ParleyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A user-supplied file attached to a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub kind: AttachmentKind,
    /// Original filename, display-only.
    pub name: String,
    /// MIME type used for classification (possibly guessed from the name).
    pub mime_type: String,
    pub locator: Locator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    /// Human-readable size, e.g. `"1.5 KB"`. Empty when the size is unknown.
    pub fn display_size(&self) -> String {
        self.size_bytes.map(format_size).unwrap_or_default()
    }
}

/// Format a byte count with binary units (B, KB, MB, GB) and one decimal.
///
/// Zero yields an empty string.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return String::new();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

// =============================================================================
// Messages
// =============================================================================

/// A rating with optional critique on an assistant turn. Immutable once
/// recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFeedback {
    pub rating: FeedbackRating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// What the user believes the assistant should have said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_content: Option<String>,
}

impl MessageFeedback {
    pub fn new(rating: FeedbackRating) -> Self {
        Self {
            rating,
            annotation: None,
            corrected_content: None,
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_corrected_content(mut self, content: impl Into<String>) -> Self {
        self.corrected_content = Some(content.into());
        self
    }

    /// Drop blank free-text fields.
    pub fn normalized(self) -> Self {
        fn non_blank(s: Option<String>) -> Option<String> {
            s.filter(|v| !v.trim().is_empty())
        }
        Self {
            rating: self.rating,
            annotation: non_blank(self.annotation),
            corrected_content: non_blank(self.corrected_content),
        }
    }
}

/// One conversational turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<MessageFeedback>,
    /// Assistant turn describing a failed completion. Kept in the transcript,
    /// never sent back to the provider.
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: String, attachments: Vec<Attachment>, is_error: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            created_at: Utc::now(),
            attachments,
            feedback: None,
            is_error,
        }
    }

    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self::new(Role::User, content.into(), attachments, false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), Vec::new(), false)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), Vec::new(), true)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Sidebar-style overview of the current conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub title: String,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

// =============================================================================
// Chat settings
// =============================================================================

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 2.0;
pub const MAX_TOKENS_MIN: u32 = 100;
pub const MAX_TOKENS_MAX: u32 = 4000;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-session chat settings, persisted as a single JSON blob.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    pub mode: ChatMode,
    /// Model identifier, passed opaquely to the completion client.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub enable_voice: bool,
    pub enable_annotations: bool,
    /// Provider API key.
    pub credential: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: ChatMode::Basic,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            enable_voice: true,
            enable_annotations: true,
            credential: String::new(),
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("mode", &self.mode)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("enable_voice", &self.enable_voice)
            .field("enable_annotations", &self.enable_annotations)
            .field("credential", &self.masked_credential())
            .finish()
    }
}

impl ChatConfig {
    /// Check numeric ranges and the model id.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ParleyError::Config("model must not be empty".to_string()));
        }
        if !self.temperature.is_finite()
            || !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&self.temperature)
        {
            return Err(ParleyError::Config(format!(
                "temperature {} outside {}..={}",
                self.temperature, TEMPERATURE_MIN, TEMPERATURE_MAX
            )));
        }
        if !(MAX_TOKENS_MIN..=MAX_TOKENS_MAX).contains(&self.max_tokens) {
            return Err(ParleyError::Config(format!(
                "max_tokens {} outside {}..={}",
                self.max_tokens, MAX_TOKENS_MIN, MAX_TOKENS_MAX
            )));
        }
        Ok(())
    }

    /// Copy with every field forced into its valid range.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let temperature = if self.temperature.is_finite() {
            self.temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX)
        } else {
            defaults.temperature
        };
        let model = if self.model.trim().is_empty() {
            defaults.model
        } else {
            self.model.clone()
        };
        Self {
            model,
            temperature,
            max_tokens: self.max_tokens.clamp(MAX_TOKENS_MIN, MAX_TOKENS_MAX),
            ..self.clone()
        }
    }

    /// Credential with everything but the last four characters hidden.
    pub fn masked_credential(&self) -> String {
        let chars: Vec<char> = self.credential.chars().collect();
        if chars.is_empty() {
            return String::new();
        }
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", "*".repeat(4), tail)
    }
}

// =============================================================================
// Tests
// =============================================================================
