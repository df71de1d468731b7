//! Backend-agnostic contract for the streaming chat core.
//!
//! This crate intentionally defines only the shared conversation/message
//! model and the two collaborator seams the session core depends on: the
//! authoritative conversation store (`SystemOfRecord`) and the raw byte
//! stream source for model generations (`StreamTransport`). It excludes
//! transport details, wire protocol payloads, and orchestration concerns.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Opaque conversation identifier assigned by the system of record.
pub type ConversationId = String;

/// Author of one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One typed segment of a structured user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Image { url: String },
    File { url: String, name: String },
}

/// Message body: plain text, or typed parts for user messages with attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

impl MessageContent {
    /// Total text length, counting only text segments of structured content.
    #[must_use]
    pub fn text_len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    MessagePart::Text { text } => text.len(),
                    _ => 0,
                })
                .sum(),
        }
    }
}

/// Upload descriptor produced by an external storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub size_bytes: u64,
    pub kind: AttachmentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Pdf,
}

impl Attachment {
    /// Converts this attachment into the message part carried on the wire.
    #[must_use]
    pub fn into_part(self) -> MessagePart {
        match self.kind {
            AttachmentKind::Image => MessagePart::Image { url: self.url },
            AttachmentKind::Pdf => MessagePart::File {
                url: self.url,
                name: self.name,
            },
        }
    }
}

/// One transcript message.
///
/// `streaming` is transient UI state and never crosses a serialization
/// boundary; a deserialized message is always settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip)]
    pub streaming: bool,
}

impl Message {
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
            reasoning: None,
            streaming: false,
        }
    }

    #[must_use]
    pub fn user_parts(parts: Vec<MessagePart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
            reasoning: None,
            streaming: false,
        }
    }

    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
            reasoning: None,
            streaming: false,
        }
    }

    /// Fresh assistant slot awaiting streamed content.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(String::new()),
            reasoning: None,
            streaming: true,
        }
    }
}

/// One conversation as held by the transcript store or the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub public: bool,
    pub branched: bool,
    pub owner_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates a private, unbranched conversation owned by `owner_id`.
    #[must_use]
    pub fn new(
        id: impl Into<ConversationId>,
        title: impl Into<String>,
        owner_id: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            public: false,
            branched: false,
            owner_id: owner_id.into(),
            created_at,
            updated_at: created_at,
            messages: Vec::new(),
        }
    }
}

/// Outbound history item submitted to the model gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl OutboundMessage {
    /// Flattens a transcript message into wire-ready parts.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        let parts = match &message.content {
            MessageContent::Text(text) => vec![MessagePart::Text { text: text.clone() }],
            MessageContent::Parts(parts) => parts.clone(),
        };
        Self {
            role: message.role,
            parts,
        }
    }
}

/// Input required to open one generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub messages: Vec<OutboundMessage>,
    pub model_id: String,
    pub web_search: bool,
}

/// Failure opening or reading a generation stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },
    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

impl TransportError {
    /// Authorization failures are rejected synchronously and never retried.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Failure reported by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("conversation '{0}' not found")]
    NotFound(ConversationId),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Raw chunked byte stream for one generation attempt.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Source of generation byte streams.
///
/// Credentials are transport configuration, not per-request arguments; a
/// transport with no usable credential must reject `open` with
/// [`TransportError::Unauthorized`] before any bytes flow.
pub trait StreamTransport: Send + Sync + 'static {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>>;
}

/// Authoritative conversation storage.
///
/// The session core treats this as the server of record: it assigns
/// conversation ids, owns durable message history, and enforces ownership
/// on truncation.
pub trait SystemOfRecord: Send + Sync + 'static {
    /// Creates a conversation and returns its server-assigned id.
    ///
    /// Implementations may kick off asynchronous title generation keyed off
    /// `first_user_message`; callers must not rely on the final title.
    fn create_conversation(
        &self,
        title: String,
        first_user_message: Option<Message>,
    ) -> BoxFuture<'static, Result<ConversationId, BackendError>>;

    /// Drops all messages from `upto_index_exclusive` onward.
    ///
    /// Must verify the caller owns the conversation.
    fn truncate_messages(
        &self,
        conversation_id: ConversationId,
        upto_index_exclusive: usize,
    ) -> BoxFuture<'static, Result<(), BackendError>>;

    /// Full snapshot of the current user's conversations.
    fn list_conversations(&self) -> BoxFuture<'static, Result<Vec<Conversation>, BackendError>>;

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'static, Result<Option<Conversation>, BackendError>>;
}
