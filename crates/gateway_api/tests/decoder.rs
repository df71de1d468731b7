use gateway_api::{NdjsonDecoder, StreamEvent};

#[test]
fn corrupt_envelope_between_valid_deltas_is_skipped() {
    let mut decoder = NdjsonDecoder::default();
    let mut events = Vec::new();

    events.extend(decoder.feed(b"{\"type\":\"delta\",\"content\":\"He\"}\n"));
    events.extend(decoder.feed(b"{\"type\":\"delta\",\"content\"llo\"}}}\n"));
    events.extend(decoder.feed(b"{\"type\":\"delta\",\"content\":\"llo\"}\n"));

    let text: String = events
        .iter()
        .map(|event| match event {
            StreamEvent::Delta { content } => content.as_str(),
            _ => "",
        })
        .collect();
    assert_eq!(text, "Hello");
    assert_eq!(events.len(), 2);
}

#[test]
fn terminal_events_decode_and_report_terminal() {
    let events = NdjsonDecoder::parse_lines(concat!(
        "{\"type\":\"complete\"}\n",
        "{\"type\":\"error\",\"message\":\"model overloaded\"}\n",
    ));

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(StreamEvent::is_terminal));
    assert_eq!(
        events[1],
        StreamEvent::Error {
            message: "model overloaded".to_string(),
        }
    );
}

#[test]
fn unknown_envelope_types_are_skipped() {
    let events = NdjsonDecoder::parse_lines(concat!(
        "{\"type\":\"usage\",\"tokens\":42}\n",
        "{\"type\":\"delta\",\"content\":\"x\"}\n",
    ));

    assert_eq!(
        events,
        vec![StreamEvent::Delta {
            content: "x".to_string(),
        }]
    );
}

#[test]
fn carriage_returns_are_tolerated() {
    let events = NdjsonDecoder::parse_lines("{\"type\":\"delta\",\"content\":\"a\"}\r\n");
    assert_eq!(
        events,
        vec![StreamEvent::Delta {
            content: "a".to_string(),
        }]
    );
}
