#![allow(dead_code)]

use std::sync::Arc;

use chat_backend_mock::{MockSystemOfRecord, ScriptedTransport};
use streamchat::{ChatClient, ChatConfig, Conversation, Message};
use time::OffsetDateTime;

pub const MODEL: &str = "model-small";
pub const USER: &str = "user-1";

pub fn client(
    config: ChatConfig,
) -> (ChatClient, Arc<MockSystemOfRecord>, Arc<ScriptedTransport>) {
    let record = Arc::new(MockSystemOfRecord::new(USER));
    let transport = ScriptedTransport::new();
    let client = ChatClient::new(record.clone(), transport.clone(), config);
    (client, record, transport)
}

pub fn at(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(seconds).expect("timestamp should be in range")
}

pub fn conversation(id: &str, messages: Vec<Message>) -> Conversation {
    let mut conversation = Conversation::new(id, format!("Conversation {id}"), USER, at(0));
    conversation.messages = messages;
    conversation
}

/// Text of the message at `index` in the only conversation, if present.
pub fn slot_text(client: &ChatClient, conversation_id: &str, index: usize) -> Option<String> {
    let conversation = client.store().conversation(&conversation_id.to_string())?;
    let message = conversation.messages.get(index)?;
    match &message.content {
        streamchat::MessageContent::Text(text) => Some(text.clone()),
        streamchat::MessageContent::Parts(_) => None,
    }
}
