//! Common test utilities
//!
//! Provides a scripted connector that replays connect outcomes and
//! `tokio_test` mock streams in order, plus event sink helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use minechat::events::{EventSink, MemorySink};
use minechat::network::Connector;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::io::Mock;

pub const ESTABLISHED: &str = "Connection established";
pub const RETRYING: &str = "No connection. Retrying.";
pub const RETRYING_AFTER_DELAY: &str = "No connection. Retrying in 3 sec.";
pub const INTERRUPTED: &str = "Connection was interrupted";
pub const CLOSED: &str = "Connection closed";

/// One scripted outcome of a connect call
pub enum Attempt {
    Refuse(io::ErrorKind),
    Accept(Mock),
    /// Never completes; exercises the connect timeout
    Hang,
}

/// Replays `Attempt`s in order; once exhausted, every connect hangs
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Attempt>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Stream = Mock;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<Mock> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Accept(mock)) => Ok(mock),
            Some(Attempt::Refuse(kind)) => Err(io::Error::from(kind)),
            Some(Attempt::Hang) | None => std::future::pending().await,
        }
    }
}

/// `n` refused connects
pub fn refusals(n: usize) -> Vec<Attempt> {
    (0..n)
        .map(|_| Attempt::Refuse(io::ErrorKind::ConnectionRefused))
        .collect()
}

/// A memory sink plus the trait-object handle sessions expect
pub fn memory_sink() -> (Arc<MemorySink>, Arc<dyn EventSink>) {
    let sink = Arc::new(MemorySink::new());
    let handle: Arc<dyn EventSink> = sink.clone();
    (sink, handle)
}

pub fn count(events: &[String], text: &str) -> usize {
    events.iter().filter(|event| event.as_str() == text).count()
}
