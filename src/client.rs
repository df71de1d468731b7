use std::sync::{Arc, Mutex, MutexGuard};

use chat_backend::{
    Attachment, BackendError, Conversation, ConversationId, Message, MessagePart, OutboundMessage,
    Role, StreamRequest, StreamTransport, SystemOfRecord,
};
use time::OffsetDateTime;
use transcript_store::{StoreSnapshot, Subscription, TranscriptStore};
use uuid::Uuid;

use crate::config::{ChatConfig, ChatContext};
use crate::error::ChatError;
use crate::reconcile::ReconciliationEngine;
use crate::session::{SessionEnd, StreamingSession};

const TITLE_MAX_CHARS: usize = 48;

/// How a send settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Completed,
    /// Retry budget exhausted; the text carries the inline error annotation.
    Failed,
    /// A newer send into the same conversation revoked this one.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub conversation_id: ConversationId,
    pub text: String,
    pub status: SendStatus,
    /// Failed stream attempts before the terminal state.
    pub attempts: u32,
}

/// UI-facing entry point: owns the transcript store and coordinates the
/// session manager and the reconciliation engine around it.
pub struct ChatClient {
    store: TranscriptStore,
    record: Arc<dyn SystemOfRecord>,
    transport: Arc<dyn StreamTransport>,
    config: ChatConfig,
    reconciler: ReconciliationEngine,
    pending_attachments: Mutex<Vec<Attachment>>,
}

impl ChatClient {
    #[must_use]
    pub fn new(
        record: Arc<dyn SystemOfRecord>,
        transport: Arc<dyn StreamTransport>,
        config: ChatConfig,
    ) -> Self {
        let store = TranscriptStore::new();
        let reconciler = ReconciliationEngine::new(store.clone(), &config);
        Self {
            store,
            record,
            transport,
            config,
            reconciler,
            pending_attachments: Mutex::new(Vec::new()),
        }
    }

    /// Handle to the observable transcript state.
    #[must_use]
    pub fn store(&self) -> TranscriptStore {
        self.store.clone()
    }

    pub fn subscribe(
        &self,
        subscriber: impl Fn(&StoreSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.store.subscribe(subscriber)
    }

    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        self.store.conversations()
    }

    #[must_use]
    pub fn selected_conversation(&self) -> Option<Conversation> {
        self.store.selected_conversation()
    }

    pub fn select(&self, conversation_id: Option<ConversationId>) {
        self.store.select(conversation_id);
    }

    #[must_use]
    pub fn is_streaming(&self, conversation_id: &ConversationId) -> bool {
        self.store.is_leased(conversation_id)
    }

    #[must_use]
    pub fn any_stream_active(&self) -> bool {
        self.store.any_lease_active()
    }

    /// Queues an uploaded attachment for the next outgoing user message.
    pub fn attach(&self, attachment: Attachment) {
        lock_unpoisoned(&self.pending_attachments).push(attachment);
    }

    #[must_use]
    pub fn pending_attachments(&self) -> Vec<Attachment> {
        lock_unpoisoned(&self.pending_attachments).clone()
    }

    /// Feeds one authoritative snapshot into the reconciliation engine.
    pub fn apply_server_snapshot(&self, snapshot: Vec<Conversation>) {
        self.reconciler.apply_snapshot(snapshot);
    }

    /// Snapshot application with an explicit merge time, for determinism.
    pub fn apply_server_snapshot_at(&self, snapshot: Vec<Conversation>, now: OffsetDateTime) {
        self.reconciler.apply_snapshot_at(snapshot, now);
    }

    /// Sends a prompt, streaming the assistant reply into the transcript.
    ///
    /// With `conversation_id = None` a conversation is created first; use
    /// [`ChatClient::send_with`] to observe the new id before streaming
    /// begins.
    pub async fn send(
        &self,
        conversation_id: Option<ConversationId>,
        prompt: &str,
        model_id: &str,
    ) -> Result<SendOutcome, ChatError> {
        self.send_with(conversation_id, prompt, model_id, |_| {}).await
    }

    pub async fn send_with(
        &self,
        conversation_id: Option<ConversationId>,
        prompt: &str,
        model_id: &str,
        on_conversation_created: impl FnOnce(&ConversationId),
    ) -> Result<SendOutcome, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        let user_message = self.build_user_message(prompt);

        let (conversation_id, user_message_in_store) = match conversation_id {
            Some(id) => {
                if self.store.conversation(&id).is_none() {
                    match self.record.get_conversation(id.clone()).await? {
                        Some(conversation) => self.store.upsert_conversation(conversation),
                        None => return Err(ChatError::UnknownConversation(id)),
                    }
                }
                (id, false)
            }
            None => {
                self.create_conversation(prompt, user_message.clone(), on_conversation_created)
                    .await?
            }
        };

        if !user_message_in_store {
            self.store.append_message(&conversation_id, user_message);
        }

        self.stream_assistant(conversation_id, model_id).await
    }

    /// Re-submits the existing history, replacing the trailing assistant
    /// response with a freshly streamed one.
    pub async fn regenerate(
        &self,
        conversation_id: &ConversationId,
        model_id: &str,
    ) -> Result<SendOutcome, ChatError> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.clone()))?;

        let len = conversation.messages.len();
        let boundary = match conversation.messages.last() {
            Some(message) if message.role == Role::Assistant => len - 1,
            _ => len,
        };
        if boundary == 0 {
            return Err(ChatError::NothingToRegenerate);
        }

        if boundary < len {
            if self.config.context != ChatContext::Ephemeral {
                self.record
                    .truncate_messages(conversation_id.clone(), boundary)
                    .await?;
            }
            self.store.truncate_messages(conversation_id, boundary);
        }

        self.stream_assistant(conversation_id.clone(), model_id).await
    }

    /// Replaces the user message at `message_index`, drops everything after
    /// it (server-authoritatively first), and streams a new reply.
    pub async fn edit_and_regenerate(
        &self,
        conversation_id: &ConversationId,
        message_index: usize,
        new_content: &str,
        model_id: &str,
    ) -> Result<SendOutcome, ChatError> {
        if new_content.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        let conversation = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.clone()))?;
        let len = conversation.messages.len();
        if message_index >= len {
            return Err(ChatError::InvalidMessageIndex {
                conversation_id: conversation_id.clone(),
                index: message_index,
                len,
            });
        }
        if conversation.messages[message_index].role != Role::User {
            return Err(ChatError::NotAUserMessage {
                index: message_index,
            });
        }

        if self.config.context != ChatContext::Ephemeral {
            self.record
                .truncate_messages(conversation_id.clone(), message_index)
                .await?;
        }
        self.store.truncate_messages(conversation_id, message_index);
        self.store
            .append_message(conversation_id, Message::user_text(new_content));

        self.stream_assistant(conversation_id.clone(), model_id).await
    }

    /// Duplicates a conversation up to `upto_index_exclusive` into a new
    /// conversation flagged as branched.
    pub async fn branch(
        &self,
        conversation_id: &ConversationId,
        upto_index_exclusive: usize,
    ) -> Result<ConversationId, ChatError> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.clone()))?;
        if upto_index_exclusive > conversation.messages.len() {
            return Err(ChatError::InvalidMessageIndex {
                conversation_id: conversation_id.clone(),
                index: upto_index_exclusive,
                len: conversation.messages.len(),
            });
        }

        let new_id = self
            .record
            .create_conversation(conversation.title.clone(), None)
            .await?;
        let mut branched = self
            .record
            .get_conversation(new_id.clone())
            .await?
            .ok_or_else(|| BackendError::NotFound(new_id.clone()))?;
        branched.branched = true;
        branched.messages = conversation.messages[..upto_index_exclusive].to_vec();
        self.store.upsert_conversation(branched);

        Ok(new_id)
    }

    /// Promotes an ephemeral conversation to a durable one.
    ///
    /// Rejected when no completed assistant message exists yet; no state is
    /// mutated in that case.
    pub async fn save_ephemeral(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationId, ChatError> {
        let conversation = self
            .store
            .conversation(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.clone()))?;

        let has_completed_reply = conversation
            .messages
            .iter()
            .any(|message| {
                message.role == Role::Assistant
                    && !message.streaming
                    && message.content.text_len() > 0
            });
        if !has_completed_reply {
            return Err(ChatError::NothingToSave);
        }

        let first_user_message = conversation
            .messages
            .iter()
            .find(|message| message.role == Role::User)
            .cloned();
        let new_id = self
            .record
            .create_conversation(conversation.title.clone(), first_user_message)
            .await?;
        let mut saved = self
            .record
            .get_conversation(new_id.clone())
            .await?
            .ok_or_else(|| BackendError::NotFound(new_id.clone()))?;
        saved.messages = conversation.messages.clone();
        self.store.upsert_conversation(saved);
        self.store.remove_conversation(conversation_id);
        self.store.select(Some(new_id.clone()));

        Ok(new_id)
    }

    async fn create_conversation(
        &self,
        prompt: &str,
        user_message: Message,
        on_conversation_created: impl FnOnce(&ConversationId),
    ) -> Result<(ConversationId, bool), ChatError> {
        let title = derive_title(prompt);

        if self.config.context == ChatContext::Ephemeral {
            // Temporary chats stay local until explicitly saved.
            let id: ConversationId = format!("local-{}", Uuid::new_v4());
            let conversation =
                Conversation::new(id.clone(), title, "local", OffsetDateTime::now_utc());
            self.store.upsert_conversation(conversation);
            self.store.select(Some(id.clone()));
            on_conversation_created(&id);
            return Ok((id, false));
        }

        let id = self
            .record
            .create_conversation(title, Some(user_message.clone()))
            .await?;
        let conversation = self
            .record
            .get_conversation(id.clone())
            .await?
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;
        // Skip the local append when the server already persisted the first
        // user message into the copy we adopted.
        let user_message_in_store = conversation.messages.last() == Some(&user_message);
        self.store.upsert_conversation(conversation);
        self.store.select(Some(id.clone()));
        on_conversation_created(&id);

        Ok((id, user_message_in_store))
    }

    async fn stream_assistant(
        &self,
        conversation_id: ConversationId,
        model_id: &str,
    ) -> Result<SendOutcome, ChatError> {
        let history: Vec<OutboundMessage> = self
            .store
            .conversation(&conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.clone()))?
            .messages
            .iter()
            .map(OutboundMessage::from_message)
            .collect();

        self.store
            .append_message(&conversation_id, Message::assistant_placeholder());
        let placeholder_index = history.len();
        let lease = self.store.acquire_lease(&conversation_id, placeholder_index);

        let request = StreamRequest {
            messages: history,
            model_id: model_id.to_string(),
            web_search: self.config.web_search,
        };
        let session = StreamingSession::new(
            self.store.clone(),
            Arc::clone(&self.transport),
            self.config.clone(),
            lease.clone(),
            request,
        );

        let (end, attempts) = session.run().await;
        match end {
            SessionEnd::Completed(text) => Ok(SendOutcome {
                conversation_id,
                text,
                status: SendStatus::Completed,
                attempts,
            }),
            SessionEnd::Failed(annotation) => Ok(SendOutcome {
                conversation_id,
                text: annotation,
                status: SendStatus::Failed,
                attempts,
            }),
            SessionEnd::Stopped(text) => Ok(SendOutcome {
                conversation_id,
                text,
                status: SendStatus::Superseded,
                attempts,
            }),
            SessionEnd::Unauthorized(message) => {
                // The placeholder never streamed; drop it and reject. A
                // revoked lease means a newer send owns the slot now, and
                // its messages must not be truncated away.
                if self.store.release_lease(&lease) {
                    self.store
                        .truncate_messages(&conversation_id, placeholder_index);
                    Err(ChatError::Unauthorized(message))
                } else {
                    Ok(SendOutcome {
                        conversation_id,
                        text: String::new(),
                        status: SendStatus::Superseded,
                        attempts,
                    })
                }
            }
        }
    }

    fn build_user_message(&self, prompt: &str) -> Message {
        let attachments: Vec<Attachment> = {
            let mut pending = lock_unpoisoned(&self.pending_attachments);
            std::mem::take(&mut *pending)
        };

        if attachments.is_empty() {
            return Message::user_text(prompt);
        }

        let mut parts = vec![MessagePart::Text {
            text: prompt.to_string(),
        }];
        parts.extend(attachments.into_iter().map(Attachment::into_part));
        Message::user_parts(parts)
    }
}

fn derive_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        title.push('…');
    }
    title
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
