mod support;

use std::sync::Arc;
use std::time::Duration;

use chat_backend_mock::{script, ScriptedChunk};
use streamchat::{ChatConfig, Message, Role, SendStatus};

use support::{at, client, conversation, slot_text, MODEL};

/// A newer send into the same conversation revokes the older stream's
/// lease; the old stream keeps reading its transport but never touches
/// the transcript again.
#[tokio::test(start_paused = true)]
async fn newer_send_supersedes_an_in_flight_stream() {
    let (client, record, transport) = client(ChatConfig::default());
    record.insert_conversation(conversation("c1", vec![Message::user_text("hi")]));
    client.apply_server_snapshot_at(record.conversations(), at(10));

    // First send: the delta only arrives after a long stall.
    transport.push_chunks(vec![
        ScriptedChunk::bytes(script::start_line(false)),
        ScriptedChunk::bytes_after(Duration::from_millis(500), script::delta_line("AAA")),
        ScriptedChunk::bytes(script::complete_line()),
    ]);
    // Second send: completes immediately.
    transport.push_lines(vec![script::delta_line("BBB"), script::complete_line()]);

    let client = Arc::new(client);
    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send(Some("c1".to_string()), "first", MODEL).await }
    });
    // Let the first send open its stream and park on the stalled chunk.
    tokio::task::yield_now().await;
    assert!(client.is_streaming(&"c1".to_string()));

    let second = client
        .send(Some("c1".to_string()), "second", MODEL)
        .await
        .expect("second send should succeed");
    assert_eq!(second.status, SendStatus::Completed);
    assert_eq!(second.text, "BBB");

    let first = first
        .await
        .expect("task should not panic")
        .expect("superseded send is not an error");
    assert_eq!(first.status, SendStatus::Superseded);

    let stored = client
        .store()
        .conversation(&"c1".to_string())
        .expect("conversation should exist");
    let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    // The abandoned slot settled empty and never received "AAA".
    assert_eq!(slot_text(&client, "c1", 2).as_deref(), Some(""));
    assert!(!stored.messages[2].streaming);
    assert_eq!(slot_text(&client, "c1", 4).as_deref(), Some("BBB"));
    assert!(!client.is_streaming(&"c1".to_string()));
}

/// A send whose open hangs and then fails unauthorized must not clean up
/// the slot once a newer send has taken it over; the newer transcript
/// stays intact.
#[tokio::test(start_paused = true)]
async fn late_unauthorized_rejection_cannot_undo_a_superseding_send() {
    let (client, record, transport) = client(ChatConfig::default());
    record.insert_conversation(conversation("c1", vec![Message::user_text("hi")]));
    client.apply_server_snapshot_at(record.conversations(), at(10));

    transport.push_connect_failure_after(
        Duration::from_millis(300),
        streamchat::TransportError::Unauthorized("token expired".to_string()),
    );
    transport.push_lines(vec![script::delta_line("BBB"), script::complete_line()]);

    let client = Arc::new(client);
    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send(Some("c1".to_string()), "first", MODEL).await }
    });
    tokio::task::yield_now().await;

    let second = client
        .send(Some("c1".to_string()), "second", MODEL)
        .await
        .expect("second send should succeed");
    assert_eq!(second.status, SendStatus::Completed);
    assert_eq!(second.text, "BBB");

    // The superseded send reports as such rather than unauthorized, and
    // touches nothing on its way out.
    let first = first
        .await
        .expect("task should not panic")
        .expect("superseded send is not an error");
    assert_eq!(first.status, SendStatus::Superseded);

    let stored = client
        .store()
        .conversation(&"c1".to_string())
        .expect("conversation should exist");
    let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(slot_text(&client, "c1", 4).as_deref(), Some("BBB"));
    assert!(!client.is_streaming(&"c1".to_string()));
}

/// Supersession during a retry backoff: the sleeping session notices its
/// revoked lease when it wakes and stops instead of reopening.
#[tokio::test(start_paused = true)]
async fn superseded_session_does_not_retry() {
    let (client, record, transport) = client(ChatConfig::default());
    record.insert_conversation(conversation("c1", vec![Message::user_text("hi")]));
    client.apply_server_snapshot_at(record.conversations(), at(10));

    transport.push_connect_failure(streamchat::TransportError::Connect(
        "reset by peer".to_string(),
    ));
    transport.push_lines(vec![script::delta_line("BBB"), script::complete_line()]);

    let client = Arc::new(client);
    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.send(Some("c1".to_string()), "first", MODEL).await }
    });
    tokio::task::yield_now().await;

    let second = client
        .send(Some("c1".to_string()), "second", MODEL)
        .await
        .expect("second send should succeed");
    assert_eq!(second.text, "BBB");

    let first = first
        .await
        .expect("task should not panic")
        .expect("superseded send is not an error");
    assert_eq!(first.status, SendStatus::Superseded);

    // One failed open for the first send, one successful open for the
    // second; the revoked session never opened again.
    assert_eq!(transport.open_count(), 2);
}
