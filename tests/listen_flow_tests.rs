//! Listen flow tests: relaying, reconnecting after end of stream, failure reporting

mod common;

use common::*;
use minechat::events::{EventSink, HistorySink};
use minechat::network::{ResilientSession, RetryPolicy};
use minechat::{ChatError, ListenFlow};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::io::Builder;

fn listener(
    connector: ScriptedConnector,
    sink: Arc<dyn EventSink>,
) -> ListenFlow<ScriptedConnector> {
    ListenFlow::new(ResilientSession::with_connector(
        "chat.test",
        5000,
        connector,
        sink,
    ))
}

#[tokio::test]
async fn test_relay_once_forwards_every_line_until_end_of_stream() {
    let (events, sink) = memory_sink();
    let mock = Builder::new().read(b"one\ntwo\n").read(b"\nthree\n").build();
    let mut flow = listener(ScriptedConnector::new([Attempt::Accept(mock)]), sink);

    let relayed = flow.relay_once().await.unwrap();

    assert_eq!(relayed, 4);
    assert_eq!(
        events.records(),
        vec![ESTABLISHED, "one", "two", "", "three", CLOSED]
    );
}

#[tokio::test(start_paused = true)]
async fn test_end_of_stream_reacquires_a_session_after_the_delay() {
    let (events, sink) = memory_sink();
    let connector = ScriptedConnector::new([
        Attempt::Accept(Builder::new().read(b"one\ntwo\n").build()),
        Attempt::Accept(Builder::new().read(b"three\n").build()),
    ]);
    let mut flow = listener(connector, sink);
    let run = flow.run();
    tokio::pin!(run);

    // Still inside the 3 second pause after the first session.
    let first = tokio::time::timeout(Duration::from_secs(2), &mut run).await;
    assert!(first.is_err(), "listener never returns on its own");
    assert_eq!(events.records(), vec![ESTABLISHED, "one", "two", CLOSED]);

    let second = tokio::time::timeout(Duration::from_secs(3), &mut run).await;
    assert!(second.is_err());
    assert_eq!(
        events.records(),
        vec![ESTABLISHED, "one", "two", CLOSED, ESTABLISHED, "three", CLOSED]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_stream_is_reported_then_retried() {
    let (events, sink) = memory_sink();
    let dropped = Builder::new()
        .read(b"before\n")
        .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
        .build();
    let connector = ScriptedConnector::new([
        Attempt::Accept(dropped),
        Attempt::Accept(Builder::new().read(b"after\n").build()),
    ]);
    let mut flow = listener(connector, sink);

    let result = flow.relay_once().await;
    assert!(matches!(result, Err(ChatError::ConnectionLost { .. })));

    let _ = tokio::time::timeout(Duration::from_secs(1), flow.run()).await;
    assert_eq!(
        events.records(),
        vec![
            ESTABLISHED,
            "before",
            INTERRUPTED,
            CLOSED,
            ESTABLISHED,
            "after",
            CLOSED
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_line_is_recorded_and_listening_continues() {
    let (events, sink) = memory_sink();
    let connector = ScriptedConnector::new([
        Attempt::Accept(Builder::new().read(&[0xff, 0xfe, b'\n']).build()),
        Attempt::Accept(Builder::new().read(b"fine\n").build()),
    ]);
    let mut flow = listener(connector, sink);

    let _ = tokio::time::timeout(Duration::from_secs(4), flow.run()).await;

    let events = events.records();
    assert_eq!(events[0], ESTABLISHED);
    assert_eq!(events[1], CLOSED);
    assert!(events[2].starts_with("Listener error: Malformed frame"));
    assert_eq!(&events[3..], &[ESTABLISHED, "fine", CLOSED]);
}

#[tokio::test(start_paused = true)]
async fn test_give_up_is_reported_once_and_listening_continues() {
    let (events, sink) = memory_sink();
    let connector = ScriptedConnector::new([
        Attempt::Refuse(io::ErrorKind::ConnectionRefused),
        Attempt::Accept(Builder::new().read(b"hi\n").build()),
    ]);
    let policy = RetryPolicy {
        max_attempts: Some(1),
        ..RetryPolicy::default()
    };
    let mut flow = ListenFlow::new(
        ResilientSession::with_connector("chat.test", 5000, connector, sink).with_policy(policy),
    );

    let _ = tokio::time::timeout(Duration::from_secs(4), flow.run()).await;

    assert_eq!(
        events.records(),
        vec![
            "No connection. Giving up after 1 attempts.",
            ESTABLISHED,
            "hi",
            CLOSED
        ]
    );
}

#[tokio::test]
async fn test_history_file_receives_timestamped_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minechat.history");
    let sink: Arc<dyn EventSink> = Arc::new(HistorySink::open_history(&path).unwrap());
    let mock = Builder::new().read(b"Alice: hi\n").build();
    let mut flow = listener(ScriptedConnector::new([Attempt::Accept(mock)]), sink);

    flow.relay_once().await.unwrap();

    let history = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = history.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with('[') && lines[0].ends_with("] Connection established"));
    assert!(lines[1].ends_with("] Alice: hi"));
    assert!(lines[2].ends_with("] Connection closed"));
}
