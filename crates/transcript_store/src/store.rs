use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chat_backend::{Conversation, ConversationId, Message, MessageContent};
use time::OffsetDateTime;

use crate::lease::StreamLease;

type SubscriberFn = Arc<dyn Fn(&StoreSnapshot) + Send + Sync>;

/// One committed store state, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub conversations: Vec<Conversation>,
    pub selected: Option<ConversationId>,
    /// True while any conversation holds a live stream lease.
    pub streaming: bool,
}

struct Inner {
    conversations: Vec<Conversation>,
    selected: Option<ConversationId>,
    leases: HashMap<ConversationId, StreamLease>,
    next_generation: u64,
    subscribers: Vec<(u64, SubscriberFn)>,
    next_subscriber_id: u64,
}

impl Inner {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            conversations: self.conversations.clone(),
            selected: self.selected.clone(),
            streaming: !self.leases.is_empty(),
        }
    }

    fn conversation_mut(&mut self, conversation_id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
    }

    fn message_mut(
        &mut self,
        conversation_id: &ConversationId,
        index: usize,
    ) -> Option<&mut Message> {
        self.conversation_mut(conversation_id)?
            .messages
            .get_mut(index)
    }

    fn lease_is_current(&self, lease: &StreamLease) -> bool {
        self.leases
            .get(lease.conversation_id())
            .is_some_and(|held| held.generation() == lease.generation())
    }
}

/// Subscribable container for all conversations visible to the current user.
#[derive(Clone)]
pub struct TranscriptStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conversations: Vec::new(),
                selected: None,
                leases: HashMap::new(),
                next_generation: 1,
                subscribers: Vec::new(),
                next_subscriber_id: 1,
            })),
        }
    }

    /// Applies one atomic transition; subscribers see the committed state
    /// after the lock is dropped, never mid-update.
    fn commit<R>(&self, apply: impl FnOnce(&mut Inner) -> (R, bool)) -> R {
        let (result, pending) = {
            let mut inner = lock_unpoisoned(&self.inner);
            let (result, changed) = apply(&mut inner);
            if changed {
                let snapshot = inner.snapshot();
                let subscribers: Vec<SubscriberFn> = inner
                    .subscribers
                    .iter()
                    .map(|(_, subscriber)| Arc::clone(subscriber))
                    .collect();
                (result, Some((snapshot, subscribers)))
            } else {
                (result, None)
            }
        };

        if let Some((snapshot, subscribers)) = pending {
            for subscriber in &subscribers {
                subscriber(&snapshot);
            }
        }

        result
    }

    fn read<R>(&self, read: impl FnOnce(&Inner) -> R) -> R {
        read(&lock_unpoisoned(&self.inner))
    }

    // --- mutation primitives ---

    /// Inserts or replaces a conversation by id.
    pub fn upsert_conversation(&self, conversation: Conversation) {
        self.commit(|inner| {
            match inner
                .conversations
                .iter_mut()
                .find(|existing| existing.id == conversation.id)
            {
                Some(existing) => *existing = conversation,
                None => inner.conversations.push(conversation),
            }
            ((), true)
        });
    }

    /// Appends a message; unknown conversation ids are a silent no-op, so
    /// callers must upsert the conversation first.
    pub fn append_message(&self, conversation_id: &ConversationId, message: Message) {
        self.commit(|inner| match inner.conversation_mut(conversation_id) {
            Some(conversation) => {
                conversation.messages.push(message);
                ((), true)
            }
            None => ((), false),
        });
    }

    /// Replaces the full text content of the message at `index`.
    ///
    /// Out-of-range indexes are a no-op; callers respecting ordering never
    /// hit that path.
    pub fn patch_message_content(
        &self,
        conversation_id: &ConversationId,
        index: usize,
        content: impl Into<String>,
    ) {
        let content = content.into();
        self.commit(|inner| match inner.message_mut(conversation_id, index) {
            Some(message) => {
                message.content = MessageContent::Text(content);
                ((), true)
            }
            None => ((), false),
        });
    }

    /// Concatenates a reasoning delta onto the message at `index`.
    pub fn append_message_reasoning(
        &self,
        conversation_id: &ConversationId,
        index: usize,
        reasoning_delta: &str,
    ) {
        self.commit(|inner| match inner.message_mut(conversation_id, index) {
            Some(message) => {
                message
                    .reasoning
                    .get_or_insert_with(String::new)
                    .push_str(reasoning_delta);
                ((), true)
            }
            None => ((), false),
        });
    }

    pub fn set_message_streaming(
        &self,
        conversation_id: &ConversationId,
        index: usize,
        streaming: bool,
    ) {
        self.commit(|inner| match inner.message_mut(conversation_id, index) {
            Some(message) => {
                message.streaming = streaming;
                ((), true)
            }
            None => ((), false),
        });
    }

    pub fn remove_conversation(&self, conversation_id: &ConversationId) {
        self.commit(|inner| {
            let before = inner.conversations.len();
            inner
                .conversations
                .retain(|conversation| &conversation.id != conversation_id);
            inner.leases.remove(conversation_id);
            if inner.selected.as_ref() == Some(conversation_id) {
                inner.selected = None;
            }
            ((), inner.conversations.len() != before)
        });
    }

    /// Drops all messages from `upto_index_exclusive` onward.
    pub fn truncate_messages(&self, conversation_id: &ConversationId, upto_index_exclusive: usize) {
        self.commit(|inner| match inner.conversation_mut(conversation_id) {
            Some(conversation) => {
                conversation.messages.truncate(upto_index_exclusive);
                ((), true)
            }
            None => ((), false),
        });
    }

    /// Atomically replaces the whole conversation list.
    ///
    /// Clears the selection when the selected conversation is absent from
    /// the new list.
    pub fn replace_conversations(&self, conversations: Vec<Conversation>) {
        self.commit(|inner| {
            inner.conversations = conversations;
            if let Some(selected) = &inner.selected {
                if !inner
                    .conversations
                    .iter()
                    .any(|conversation| &conversation.id == selected)
                {
                    inner.selected = None;
                }
            }
            ((), true)
        });
    }

    pub fn select(&self, conversation_id: Option<ConversationId>) {
        self.commit(|inner| {
            let changed = inner.selected != conversation_id;
            inner.selected = conversation_id;
            ((), changed)
        });
    }

    // --- lease coordination ---

    /// Acquires the exclusive write claim for one (conversation, index) slot.
    ///
    /// Any prior lease on the same conversation is revoked first; a new send
    /// always supersedes rather than queues (last-send-wins).
    pub fn acquire_lease(&self, conversation_id: &ConversationId, message_index: usize) -> StreamLease {
        self.commit(|inner| {
            let generation = inner.next_generation;
            inner.next_generation += 1;
            let lease = StreamLease::new(conversation_id.clone(), message_index, generation);
            if let Some(revoked) = inner.leases.insert(conversation_id.clone(), lease.clone()) {
                // Settle the abandoned slot: at most one message streams
                // per conversation at any time.
                if let Some(message) =
                    inner.message_mut(revoked.conversation_id(), revoked.message_index())
                {
                    message.streaming = false;
                }
                tracing::info!(
                    conversation = %conversation_id,
                    revoked_generation = revoked.generation(),
                    generation,
                    "stream lease superseded"
                );
            }
            (lease, true)
        })
    }

    /// Releases a lease; stale generations are ignored.
    pub fn release_lease(&self, lease: &StreamLease) -> bool {
        self.commit(|inner| {
            if inner.lease_is_current(lease) {
                inner.leases.remove(lease.conversation_id());
                (true, true)
            } else {
                (false, false)
            }
        })
    }

    #[must_use]
    pub fn lease_is_current(&self, lease: &StreamLease) -> bool {
        self.read(|inner| inner.lease_is_current(lease))
    }

    #[must_use]
    pub fn is_leased(&self, conversation_id: &ConversationId) -> bool {
        self.read(|inner| inner.leases.contains_key(conversation_id))
    }

    #[must_use]
    pub fn any_lease_active(&self) -> bool {
        self.read(|inner| !inner.leases.is_empty())
    }

    // --- lease-guarded stream writes ---
    //
    // The generation check and the write happen under one lock: a revoked
    // session can never slip a write between check and apply.

    /// Replaces the leased slot's content; returns false for stale leases.
    pub fn patch_streamed_content(&self, lease: &StreamLease, content: &str) -> bool {
        self.commit(|inner| {
            if !inner.lease_is_current(lease) {
                return (false, false);
            }
            match inner.message_mut(lease.conversation_id(), lease.message_index()) {
                Some(message) => {
                    message.content = MessageContent::Text(content.to_string());
                    (true, true)
                }
                None => (false, false),
            }
        })
    }

    /// Appends reasoning onto the leased slot; returns false for stale leases.
    pub fn append_streamed_reasoning(&self, lease: &StreamLease, delta: &str) -> bool {
        self.commit(|inner| {
            if !inner.lease_is_current(lease) {
                return (false, false);
            }
            match inner.message_mut(lease.conversation_id(), lease.message_index()) {
                Some(message) => {
                    message
                        .reasoning
                        .get_or_insert_with(String::new)
                        .push_str(delta);
                    (true, true)
                }
                None => (false, false),
            }
        })
    }

    /// Settles the leased slot and releases the lease in one transition.
    pub fn finalize_streamed_message(
        &self,
        lease: &StreamLease,
        content: &str,
        updated_at: OffsetDateTime,
    ) -> bool {
        self.commit(|inner| {
            if !inner.lease_is_current(lease) {
                return (false, false);
            }
            let Some(message) = inner.message_mut(lease.conversation_id(), lease.message_index())
            else {
                return (false, false);
            };
            message.content = MessageContent::Text(content.to_string());
            message.streaming = false;
            if let Some(conversation) = inner.conversation_mut(lease.conversation_id()) {
                conversation.updated_at = updated_at;
            }
            inner.leases.remove(lease.conversation_id());
            (true, true)
        })
    }

    // --- reads ---

    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.read(Inner::snapshot)
    }

    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        self.read(|inner| inner.conversations.clone())
    }

    #[must_use]
    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<Conversation> {
        self.read(|inner| {
            inner
                .conversations
                .iter()
                .find(|conversation| &conversation.id == conversation_id)
                .cloned()
        })
    }

    #[must_use]
    pub fn selected(&self) -> Option<ConversationId> {
        self.read(|inner| inner.selected.clone())
    }

    #[must_use]
    pub fn selected_conversation(&self) -> Option<Conversation> {
        self.read(|inner| {
            let selected = inner.selected.as_ref()?;
            inner
                .conversations
                .iter()
                .find(|conversation| &conversation.id == selected)
                .cloned()
        })
    }

    /// Registers a subscriber invoked after every committed transition.
    ///
    /// The subscription ends when the returned guard is dropped.
    pub fn subscribe(
        &self,
        subscriber: impl Fn(&StoreSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = {
            let mut inner = lock_unpoisoned(&self.inner);
            let id = inner.next_subscriber_id;
            inner.next_subscriber_id += 1;
            inner.subscribers.push((id, Arc::new(subscriber)));
            id
        };

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }
}

/// Guard for one store subscription; unsubscribes on drop.
pub struct Subscription {
    inner: Weak<Mutex<Inner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = lock_unpoisoned(&inner);
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
