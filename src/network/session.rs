//! Retrying connection manager.
//!
//! A [`ResilientSession`] connects to one `(host, port)`, retrying refused or reset
//! connects according to its [`RetryPolicy`], and hands a [`LineStream`] to a caller
//! supplied scope. Every established connection is reported with exactly one
//! "Connection established" and one final "Connection closed" event, whichever way the
//! scope ends: success, error, or the whole future being dropped.

use crate::error::{ChatError, Result};
use crate::events::EventSink;
use crate::messages::wire::{is_connection_drop_kind, LineCodec};
use crate::network::connection::{Connector, LineStream, TcpConnector};
use std::fmt;
use std::future::Future;
use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

pub const ATTEMPTS_BEFORE_DELAY: u32 = 2;
pub const ATTEMPT_DELAY_SECS: u64 = 3;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Future returned by a session scope; borrows the line stream for `'a`.
pub type ScopeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// When and how often to retry a failed connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures retried immediately before delays kick in
    pub attempts_before_delay: u32,
    /// Pause before each retry once the immediate ones are used up
    pub attempt_delay: Duration,
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Stop after this many failed attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_before_delay: ATTEMPTS_BEFORE_DELAY,
            attempt_delay: Duration::from_secs(ATTEMPT_DELAY_SECS),
            connect_timeout: CONNECT_TIMEOUT,
            max_attempts: None,
        }
    }
}

/// Connect failures counted since the last connection that delivered a line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts_since_success: u32,
}

impl RetryState {
    pub fn reset(&mut self) {
        self.attempts_since_success = 0;
    }
}

/// Lifecycle phases, traced as a session moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    ClosingSuccess,
    ClosingFailure,
    Terminated,
}

/// Status events reported to the event sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    Retrying,
    RetryingAfter(Duration),
    GaveUp { attempts: u32 },
    Unreachable(String),
    Interrupted,
    Closed,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Established => write!(f, "Connection established"),
            SessionEvent::Retrying => write!(f, "No connection. Retrying."),
            SessionEvent::RetryingAfter(delay) => {
                write!(f, "No connection. Retrying in {} sec.", delay.as_secs())
            }
            SessionEvent::GaveUp { attempts } => {
                write!(f, "No connection. Giving up after {} attempts.", attempts)
            }
            SessionEvent::Unreachable(reason) => write!(f, "No connection: {}", reason),
            SessionEvent::Interrupted => write!(f, "Connection was interrupted"),
            SessionEvent::Closed => write!(f, "Connection closed"),
        }
    }
}

fn is_retryable_connect_error(error: &io::Error) -> bool {
    is_connection_drop_kind(error.kind())
        || matches!(
            error.kind(),
            ErrorKind::TimedOut
                | ErrorKind::AddrNotAvailable
                | ErrorKind::Interrupted
                | ErrorKind::NetworkUnreachable
                | ErrorKind::HostUnreachable
                | ErrorKind::NetworkDown
        )
}

/// Owns an open connection and reports "Connection closed" exactly once,
/// from `close` or, if the scope was cancelled, from `Drop`.
struct OpenConnection<S: AsyncRead + AsyncWrite + Unpin> {
    lines: Option<LineStream<S>>,
    sink: Arc<dyn EventSink>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> OpenConnection<S> {
    fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { lines: None, sink }
    }


    fn lines_received(&self) -> u64 {
        self.lines.as_ref().map_or(0, LineStream::lines_received)
    }

    async fn close(mut self) {
        if let Some(lines) = self.lines.as_mut() {
            if let Err(e) = lines.shutdown().await {
                debug!(error = %e, "Transport shutdown reported an error");
            }
        }
        // Cancelled during shutdown: Drop still reports the close.
        if let Some(lines) = self.lines.take() {
            drop(lines);
            self.sink.record(&SessionEvent::Closed.to_string());
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Drop for OpenConnection<S> {
    fn drop(&mut self) {
        if let Some(lines) = self.lines.take() {
            drop(lines);
            debug!("Session scope cancelled, connection dropped");
            self.sink.record(&SessionEvent::Closed.to_string());
        }
    }
}

/// Connection manager for one host/port pair
pub struct ResilientSession<C: Connector = TcpConnector> {
    host: String,
    port: u16,
    connector: C,
    policy: RetryPolicy,
    codec: LineCodec,
    sink: Arc<dyn EventSink>,
    retry_state: RetryState,
}

impl ResilientSession<TcpConnector> {
    pub fn new(host: impl Into<String>, port: u16, sink: Arc<dyn EventSink>) -> Self {
        Self::with_connector(host, port, TcpConnector, sink)
    }
}

impl<C: Connector> ResilientSession<C> {
    pub fn with_connector(
        host: impl Into<String>,
        port: u16,
        connector: C,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connector,
            policy: RetryPolicy::default(),
            codec: LineCodec::default(),
            sink,
            retry_state: RetryState::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_codec(mut self, codec: LineCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry_state
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    fn emit(&self, event: SessionEvent) {
        self.sink.record(&event.to_string());
    }

    /// Connect (retrying per policy), run `scope` against the live line stream, then
    /// close the connection and report it.
    ///
    /// Transport drops inside the scope become [`ChatError::ConnectionLost`] and are
    /// not retried here; any other scope error is returned unchanged.
    #[instrument(level = "debug", skip(self, scope), fields(host = %self.host, port = self.port))]
    pub async fn with_session<T, F>(&mut self, scope: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut LineStream<C::Stream>) -> ScopeFuture<'a, T>,
    {
        debug!(state = ?SessionState::Connecting, "Opening session");
        let stream = self.connect_with_retry().await?;

        self.emit(SessionEvent::Established);
        debug!(state = ?SessionState::Connected, "Session connected");

        let mut connection = OpenConnection::new(self.sink());
        let lines = connection
            .lines
            .insert(LineStream::new(stream, self.codec.clone()));
        let outcome = scope(lines).await;

        if connection.lines_received() > 0 {
            self.retry_state.reset();
        }

        let outcome = match outcome {
            Err(ChatError::Wire(e)) if e.is_connection_drop() => {
                warn!(error = %e, "Connection dropped mid-session");
                self.emit(SessionEvent::Interrupted);
                Err(ChatError::ConnectionLost {
                    host: self.host.clone(),
                    port: self.port,
                    reason: e.to_string(),
                })
            }
            other => other,
        };

        let closing = if outcome.is_ok() {
            SessionState::ClosingSuccess
        } else {
            SessionState::ClosingFailure
        };
        debug!(state = ?closing, "Closing session");
        connection.close().await;
        debug!(state = ?SessionState::Terminated, "Session terminated");

        outcome
    }

    async fn connect_with_retry(&mut self) -> Result<C::Stream> {
        let mut failures: u32 = 0;

        loop {
            let error = match tokio::time::timeout(
                self.policy.connect_timeout,
                self.connector.connect(&self.host, self.port),
            )
            .await
            {
                Ok(Ok(stream)) => {
                    info!(host = %self.host, port = self.port, "Connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => e,
                Err(_elapsed) => io::Error::new(
                    ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.policy.connect_timeout),
                ),
            };

            failures += 1;

            if !is_retryable_connect_error(&error) {
                warn!(error = %error, "Connect failed with a non-retryable error");
                self.emit(SessionEvent::Unreachable(error.to_string()));
                return Err(self.connection_failed(failures, error));
            }

            if self.policy.max_attempts.is_some_and(|max| failures >= max) {
                warn!(attempts = failures, "Connect attempts exhausted");
                self.emit(SessionEvent::GaveUp { attempts: failures });
                return Err(self.connection_failed(failures, error));
            }

            if self.retry_state.attempts_since_success < self.policy.attempts_before_delay {
                self.retry_state.attempts_since_success += 1;
                debug!(
                    error = %error,
                    attempt = self.retry_state.attempts_since_success,
                    "Connect failed, retrying immediately"
                );
                self.emit(SessionEvent::Retrying);
            } else {
                let delay = self.policy.attempt_delay;
                debug!(error = %error, ?delay, "Connect failed, backing off");
                self.emit(SessionEvent::RetryingAfter(delay));
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn connection_failed(&self, attempts: u32, source: io::Error) -> ChatError {
        ChatError::ConnectionFailed {
            host: self.host.clone(),
            port: self.port,
            attempts,
            source,
        }
    }
}
