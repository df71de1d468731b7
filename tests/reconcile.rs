mod support;

use std::sync::Arc;
use std::time::Duration;

use chat_backend_mock::{script, ScriptedChunk};
use streamchat::{ChatConfig, Message, SendStatus};

use support::{at, client, conversation, slot_text, MODEL};

#[tokio::test(start_paused = true)]
async fn snapshots_adopt_server_conversations_in_server_order() {
    let (client, record, _transport) = client(ChatConfig::default());
    record.insert_conversation(conversation("b", vec![Message::user_text("hi")]));
    record.insert_conversation(conversation("a", vec![Message::user_text("yo")]));

    client.apply_server_snapshot_at(record.conversations(), at(10));

    let ids: Vec<String> = client.conversations().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
}

/// A snapshot landing mid-stream must not clobber the streaming message
/// list, but non-message metadata still updates.
#[tokio::test(start_paused = true)]
async fn snapshot_during_a_stream_leaves_the_transcript_alone() {
    let (client, record, transport) = client(ChatConfig::default());
    record.insert_conversation(conversation("c1", vec![Message::user_text("hi")]));
    client.apply_server_snapshot_at(record.conversations(), at(10));

    transport.push_chunks(vec![
        ScriptedChunk::bytes(script::delta_line("strea")),
        ScriptedChunk::bytes_after(Duration::from_millis(200), script::delta_line("ming")),
        ScriptedChunk::bytes(script::complete_line()),
    ]);

    let client = Arc::new(client);
    let send = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send(Some("c1".to_string()), "go", MODEL).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(slot_text(&client, "c1", 2).as_deref(), Some("strea"));

    // Stale server copy: still only the original message, but renamed.
    let mut stale = conversation("c1", vec![Message::user_text("hi")]);
    stale.title = "Renamed on another device".to_string();
    client.apply_server_snapshot_at(vec![stale], at(11));

    let stored = client
        .store()
        .conversation(&"c1".to_string())
        .expect("conversation should exist");
    assert_eq!(stored.title, "Renamed on another device");
    assert_eq!(stored.messages.len(), 3);
    assert!(stored.messages[2].streaming);

    let outcome = send
        .await
        .expect("task should not panic")
        .expect("send should succeed");
    assert_eq!(outcome.status, SendStatus::Completed);
    assert_eq!(outcome.text, "streaming");
}

/// A stale echo of a reply the user already replaced locally must not
/// win; a genuinely longer server reply must.
#[tokio::test(start_paused = true)]
async fn stale_echo_loses_longer_server_reply_wins() {
    let (client, _record, _transport) = client(ChatConfig::default());
    let local = conversation(
        "c1",
        vec![
            Message::user_text("hi"),
            Message::assistant_text("a freshly completed local answer"),
        ],
    );
    client.store().upsert_conversation(local);

    // Echo of an older, shorter reply: same shape, within the slack margin.
    let echo = conversation(
        "c1",
        vec![
            Message::user_text("hi"),
            Message::assistant_text("a freshly completed local"),
        ],
    );
    client.apply_server_snapshot_at(vec![echo], at(10));
    assert_eq!(
        slot_text(&client, "c1", 1).as_deref(),
        Some("a freshly completed local answer")
    );

    // A materially longer server reply is authoritative.
    let longer = conversation(
        "c1",
        vec![
            Message::user_text("hi"),
            Message::assistant_text(
                "a freshly completed local answer, extended by the server with more detail",
            ),
        ],
    );
    client.apply_server_snapshot_at(vec![longer], at(11));
    assert_eq!(
        slot_text(&client, "c1", 1).as_deref(),
        Some("a freshly completed local answer, extended by the server with more detail")
    );
}

#[tokio::test(start_paused = true)]
async fn local_only_conversations_expire_out_of_snapshots() {
    let (client, _record, _transport) = client(ChatConfig::default());

    let mut fresh = conversation("fresh", vec![Message::user_text("hi")]);
    fresh.created_at = at(90);
    let mut stale = conversation("stale", vec![Message::user_text("old")]);
    stale.created_at = at(10);
    client.store().upsert_conversation(fresh);
    client.store().upsert_conversation(stale);
    client.select(Some("stale".to_string()));

    client.apply_server_snapshot_at(Vec::new(), at(100));

    let ids: Vec<String> = client.conversations().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["fresh".to_string()]);
    // Selection pointed at the dropped conversation and was cleared.
    assert!(client.selected_conversation().is_none());
}
