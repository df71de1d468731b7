use chat_backend::ConversationId;

/// Exclusive, revocable claim on one (conversation, message index) slot.
///
/// At most one lease is live per conversation. Acquiring a new lease for a
/// conversation revokes the prior one; revoked holders fail the generation
/// check on every subsequent write attempt, so a superseded stream can keep
/// reading its transport without corrupting the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLease {
    conversation_id: ConversationId,
    message_index: usize,
    generation: u64,
}

impl StreamLease {
    pub(crate) fn new(
        conversation_id: ConversationId,
        message_index: usize,
        generation: u64,
    ) -> Self {
        Self {
            conversation_id,
            message_index,
            generation,
        }
    }

    #[must_use]
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    #[must_use]
    pub fn message_index(&self) -> usize {
        self.message_index
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
