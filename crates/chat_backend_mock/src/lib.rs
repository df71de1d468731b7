//! Deterministic mock implementations of the shared `chat_backend` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing: an in-memory system
//! of record plus a scripted byte-stream transport whose attempts, chunk
//! boundaries, delays, and failures are fully caller-controlled.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chat_backend::{
    BackendError, ByteStream, Conversation, ConversationId, Message, StreamRequest,
    StreamTransport, SystemOfRecord, TransportError,
};
use futures_util::future::{ready, BoxFuture};
use futures_util::{FutureExt, StreamExt};
use time::OffsetDateTime;
use uuid::Uuid;

// --- system of record ---

struct RecordState {
    conversations: HashMap<ConversationId, Conversation>,
    insertion_order: Vec<ConversationId>,
}

/// In-memory system of record scoped to one current user.
pub struct MockSystemOfRecord {
    current_user: String,
    state: Arc<Mutex<RecordState>>,
}

impl MockSystemOfRecord {
    #[must_use]
    pub fn new(current_user: impl Into<String>) -> Self {
        Self {
            current_user: current_user.into(),
            state: Arc::new(Mutex::new(RecordState {
                conversations: HashMap::new(),
                insertion_order: Vec::new(),
            })),
        }
    }

    /// Seeds a conversation directly, bypassing ownership checks.
    pub fn insert_conversation(&self, conversation: Conversation) {
        let mut state = lock_unpoisoned(&self.state);
        if !state.conversations.contains_key(&conversation.id) {
            state.insertion_order.push(conversation.id.clone());
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation);
    }

    /// Replaces a conversation's message list, as the streaming proxy would
    /// after persisting a completed generation.
    pub fn set_messages(&self, conversation_id: &ConversationId, messages: Vec<Message>) {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(conversation) = state.conversations.get_mut(conversation_id) {
            conversation.messages = messages;
        }
    }

    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        let state = lock_unpoisoned(&self.state);
        state
            .insertion_order
            .iter()
            .filter_map(|id| state.conversations.get(id).cloned())
            .collect()
    }

    pub fn remove_conversation(&self, conversation_id: &ConversationId) {
        let mut state = lock_unpoisoned(&self.state);
        state.conversations.remove(conversation_id);
        state.insertion_order.retain(|id| id != conversation_id);
    }
}

impl SystemOfRecord for MockSystemOfRecord {
    fn create_conversation(
        &self,
        title: String,
        first_user_message: Option<Message>,
    ) -> BoxFuture<'static, Result<ConversationId, BackendError>> {
        let id: ConversationId = Uuid::new_v4().to_string();
        let mut conversation =
            Conversation::new(id.clone(), title, &self.current_user, OffsetDateTime::now_utc());
        conversation.messages.extend(first_user_message);

        let mut state = lock_unpoisoned(&self.state);
        state.insertion_order.push(id.clone());
        state.conversations.insert(id.clone(), conversation);

        ready(Ok(id)).boxed()
    }

    fn truncate_messages(
        &self,
        conversation_id: ConversationId,
        upto_index_exclusive: usize,
    ) -> BoxFuture<'static, Result<(), BackendError>> {
        let mut state = lock_unpoisoned(&self.state);
        let result = match state.conversations.get_mut(&conversation_id) {
            Some(conversation) if conversation.owner_id == self.current_user => {
                conversation.messages.truncate(upto_index_exclusive);
                Ok(())
            }
            Some(_) => Err(BackendError::PermissionDenied(format!(
                "conversation '{conversation_id}' belongs to another user"
            ))),
            None => Err(BackendError::NotFound(conversation_id)),
        };
        ready(result).boxed()
    }

    fn list_conversations(&self) -> BoxFuture<'static, Result<Vec<Conversation>, BackendError>> {
        ready(Ok(self.conversations())).boxed()
    }

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'static, Result<Option<Conversation>, BackendError>> {
        let state = lock_unpoisoned(&self.state);
        ready(Ok(state.conversations.get(&conversation_id).cloned())).boxed()
    }
}

// --- scripted transport ---

/// One scripted chunk: an optional delivery delay followed by a payload.
#[derive(Debug, Clone)]
pub struct ScriptedChunk {
    pub delay: Option<Duration>,
    pub payload: Result<Vec<u8>, TransportError>,
}

impl ScriptedChunk {
    #[must_use]
    pub fn bytes(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delay: None,
            payload: Ok(payload.into()),
        }
    }

    #[must_use]
    pub fn bytes_after(delay: Duration, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delay: Some(delay),
            payload: Ok(payload.into()),
        }
    }

    #[must_use]
    pub fn failure(error: TransportError) -> Self {
        Self {
            delay: None,
            payload: Err(error),
        }
    }

    #[must_use]
    pub fn failure_after(delay: Duration, error: TransportError) -> Self {
        Self {
            delay: Some(delay),
            payload: Err(error),
        }
    }
}

enum ScriptedAttempt {
    Chunks(Vec<ScriptedChunk>),
    ConnectFailure {
        delay: Option<Duration>,
        error: TransportError,
    },
}

/// Transport whose stream attempts are fully scripted by the test.
///
/// Each `open` call consumes the next scripted attempt in order; opening
/// past the script is a connect failure.
#[derive(Default)]
pub struct ScriptedTransport {
    attempts: Mutex<VecDeque<ScriptedAttempt>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_chunks(&self, chunks: Vec<ScriptedChunk>) {
        lock_unpoisoned(&self.attempts).push_back(ScriptedAttempt::Chunks(chunks));
    }

    /// Scripts one attempt delivering each line as its own chunk.
    pub fn push_lines(&self, lines: Vec<Vec<u8>>) {
        self.push_chunks(lines.into_iter().map(ScriptedChunk::bytes).collect());
    }

    pub fn push_connect_failure(&self, error: TransportError) {
        lock_unpoisoned(&self.attempts)
            .push_back(ScriptedAttempt::ConnectFailure { delay: None, error });
    }

    /// Scripts an attempt whose `open` stays pending for `delay` before
    /// failing.
    pub fn push_connect_failure_after(&self, delay: Duration, error: TransportError) {
        lock_unpoisoned(&self.attempts).push_back(ScriptedAttempt::ConnectFailure {
            delay: Some(delay),
            error,
        });
    }

    /// Requests observed so far, in `open` order.
    #[must_use]
    pub fn requests(&self) -> Vec<StreamRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }
}

impl StreamTransport for ScriptedTransport {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream, TransportError>> {
        lock_unpoisoned(&self.requests).push(request);

        let attempt = lock_unpoisoned(&self.attempts).pop_front();
        async move {
            match attempt {
                Some(ScriptedAttempt::ConnectFailure { delay, error }) => {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    Err(error)
                }
                Some(ScriptedAttempt::Chunks(chunks)) => {
                    let queue: VecDeque<ScriptedChunk> = chunks.into();
                    let stream = futures_util::stream::unfold(queue, |mut queue| async move {
                        let chunk = queue.pop_front()?;
                        if let Some(delay) = chunk.delay {
                            tokio::time::sleep(delay).await;
                        }
                        Some((chunk.payload, queue))
                    })
                    .boxed();
                    Ok(stream)
                }
                None => Err(TransportError::Connect(
                    "no scripted attempt remaining".to_string(),
                )),
            }
        }
        .boxed()
    }
}

/// NDJSON line builders matching the gateway stream envelope shapes.
pub mod script {
    #[must_use]
    pub fn start_line(supports_reasoning: bool) -> Vec<u8> {
        format!("{{\"type\":\"start\",\"supports_reasoning\":{supports_reasoning}}}\n").into_bytes()
    }

    #[must_use]
    pub fn delta_line(content: &str) -> Vec<u8> {
        serde_line("delta", "content", content)
    }

    #[must_use]
    pub fn reasoning_line(content: &str) -> Vec<u8> {
        serde_line("reasoning", "content", content)
    }

    #[must_use]
    pub fn complete_line() -> Vec<u8> {
        b"{\"type\":\"complete\"}\n".to_vec()
    }

    #[must_use]
    pub fn error_line(message: &str) -> Vec<u8> {
        serde_line("error", "message", message)
    }

    fn serde_line(event_type: &str, field: &str, value: &str) -> Vec<u8> {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{{\"type\":\"{event_type}\",\"{field}\":\"{escaped}\"}}\n").into_bytes()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
