use chat_backend::{BackendError, ConversationId};
use thiserror::Error;

/// Terminal rejections surfaced to the UI caller.
///
/// Transport and protocol failures during streaming never appear here; they
/// are retried and, on exhaustion, annotated inline in the assistant
/// message so conversation continuity is preserved.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conversation '{0}' is not known")]
    UnknownConversation(ConversationId),

    #[error("message index {index} is out of range for conversation '{conversation_id}' ({len} messages)")]
    InvalidMessageIndex {
        conversation_id: ConversationId,
        index: usize,
        len: usize,
    },

    #[error("only user messages can be edited; index {index} is not a user message")]
    NotAUserMessage { index: usize },

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("conversation has no messages to regenerate")]
    NothingToRegenerate,

    #[error("temporary chat has no completed messages to save")]
    NothingToSave,

    #[error(transparent)]
    Backend(#[from] BackendError),
}
