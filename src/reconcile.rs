use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chat_backend::{Conversation, ConversationId};
use time::OffsetDateTime;
use transcript_store::TranscriptStore;

use crate::config::ChatConfig;

/// Merges authoritative snapshots into the transcript store without
/// corrupting in-flight streams or resurrecting deleted conversations.
pub struct ReconciliationEngine {
    store: TranscriptStore,
    slack_margin: usize,
    freshness_window: Duration,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(store: TranscriptStore, config: &ChatConfig) -> Self {
        Self {
            store,
            slack_margin: config.slack_margin,
            freshness_window: config.freshness_window,
        }
    }

    /// Applies one full server snapshot of the user's conversations.
    pub fn apply_snapshot(&self, server: Vec<Conversation>) {
        self.apply_snapshot_at(server, OffsetDateTime::now_utc());
    }

    /// Snapshot application with an explicit merge time, for determinism.
    pub fn apply_snapshot_at(&self, server: Vec<Conversation>, now: OffsetDateTime) {
        let local = self.store.conversations();
        let leased: HashSet<ConversationId> = local
            .iter()
            .filter(|conversation| self.store.is_leased(&conversation.id))
            .map(|conversation| conversation.id.clone())
            .collect();

        let merged = merge_snapshot(
            &local,
            server,
            &leased,
            self.slack_margin,
            self.freshness_window,
            now,
        );
        self.store.replace_conversations(merged);
    }
}

/// Pure merge of one server snapshot against local state.
///
/// Server order wins for conversations the server knows; retained
/// local-only conversations follow in local order.
fn merge_snapshot(
    local: &[Conversation],
    server: Vec<Conversation>,
    leased: &HashSet<ConversationId>,
    slack_margin: usize,
    freshness_window: Duration,
    now: OffsetDateTime,
) -> Vec<Conversation> {
    let local_by_id: HashMap<&ConversationId, &Conversation> = local
        .iter()
        .map(|conversation| (&conversation.id, conversation))
        .collect();
    let server_ids: HashSet<ConversationId> = server
        .iter()
        .map(|conversation| conversation.id.clone())
        .collect();

    let mut merged = Vec::with_capacity(server.len());
    for server_conversation in server {
        let Some(local_conversation) = local_by_id.get(&server_conversation.id) else {
            merged.push(server_conversation);
            continue;
        };

        if leased.contains(&server_conversation.id) {
            // An active stream owns this message list; only the
            // non-message fields may come from the server.
            merged.push(with_local_messages(server_conversation, local_conversation));
        } else if accepts_server_messages(local_conversation, &server_conversation, slack_margin) {
            merged.push(server_conversation);
        } else {
            merged.push(with_local_messages(server_conversation, local_conversation));
        }
    }

    let freshness_window =
        time::Duration::try_from(freshness_window).unwrap_or(time::Duration::MAX);
    for local_conversation in local {
        if server_ids.contains(&local_conversation.id) {
            continue;
        }
        // An active stream pins its conversation regardless of age;
        // dropping it would orphan the session mid-write.
        if leased.contains(&local_conversation.id)
            || now - local_conversation.created_at <= freshness_window
        {
            merged.push(local_conversation.clone());
        } else {
            tracing::debug!(
                conversation = %local_conversation.id,
                "dropping stale local-only conversation"
            );
        }
    }

    merged
}

fn with_local_messages(mut server: Conversation, local: &Conversation) -> Conversation {
    server.messages = local.messages.clone();
    server
}

/// Whether the server's message list replaces the local one wholesale.
///
/// Two independent triggers avoid flapping: naive length comparison alone
/// would let a slightly-stale server echo clobber a just-finished local
/// edit during the network round-trip.
fn accepts_server_messages(local: &Conversation, server: &Conversation, slack_margin: usize) -> bool {
    if server.messages.len() > local.messages.len() {
        return true;
    }

    let (Some(local_last), Some(server_last)) = (local.messages.last(), server.messages.last())
    else {
        return false;
    };

    local_last.role == server_last.role
        && !local_last.streaming
        && server_last.content.text_len() > local_last.content.text_len() + slack_margin
}
