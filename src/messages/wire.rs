use regex::Regex;
use std::io::ErrorKind;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, trace, warn};

// Wire protocol constants
pub const LINE_TERMINATOR: u8 = b'\n';
pub const MESSAGE_TERMINATOR: &str = "\n\n";
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024; // 64KB per server line
pub const MIN_MAX_LINE_LENGTH: usize = 256;

/// Configuration for line framing
#[derive(Debug, Clone)]
pub struct WireConfig {
    pub max_line_length: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl WireConfig {
    /// Create a WireConfig with a custom line length limit
    ///
    /// Limits below `MIN_MAX_LINE_LENGTH` are raised to it, since the server's
    /// own prompts would not fit otherwise.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length: max_line_length.max(MIN_MAX_LINE_LENGTH),
        }
    }
}

/// Custom error types for line framing
#[derive(Error, Debug)]
pub enum WireProtocolError {
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("Line too long: exceeds maximum of {max_length} bytes")]
    LineTooLong { max_length: usize },

    #[error("Unexpected end of stream while reading {operation}")]
    UnexpectedEof { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        WireProtocolError::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Whether this error means the peer went away mid-conversation.
    pub fn is_connection_drop(&self) -> bool {
        match self {
            WireProtocolError::UnexpectedEof { .. } => true,
            WireProtocolError::Io(e) => is_connection_drop_kind(e.kind()),
            _ => false,
        }
    }
}

pub fn is_connection_drop_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

fn newline_runs() -> &'static Regex {
    static NEWLINE_RUNS: OnceLock<Regex> = OnceLock::new();
    NEWLINE_RUNS.get_or_init(|| Regex::new(r"\n+").expect("newline pattern is valid"))
}

/// Collapse every run of newlines into a single `\n` and drop leading/trailing ones.
///
/// A blank line ends a message on the wire, so the body itself must never contain one.
pub fn collapse_newlines(text: &str) -> String {
    newline_runs()
        .replace_all(text, "\n")
        .trim_matches('\n')
        .to_string()
}

/// Length of a raw line without its `\n` or `\r\n` terminator
fn content_length(buffer: &[u8]) -> usize {
    let line = buffer.strip_suffix(&[LINE_TERMINATOR]).unwrap_or(buffer);
    line.strip_suffix(b"\r").unwrap_or(line).len()
}

/// Newline-delimited UTF-8 framing
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    wire_config: WireConfig,
}

impl LineCodec {
    pub fn new(wire_config: WireConfig) -> Self {
        Self { wire_config }
    }

    /// Encode a single protocol line: `text` followed by `\n`.
    pub fn encode_line(&self, text: &str) -> Vec<u8> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(LINE_TERMINATOR);
        frame
    }

    /// Encode a chat message: collapsed body followed by a terminating blank line.
    pub fn encode_message(&self, text: &str) -> Vec<u8> {
        let body = collapse_newlines(text);
        let mut frame = Vec::with_capacity(body.len() + MESSAGE_TERMINATOR.len());
        frame.extend_from_slice(body.as_bytes());
        frame.extend_from_slice(MESSAGE_TERMINATOR.as_bytes());
        frame
    }

    /// Decode one raw line, stripping the terminator and trailing whitespace.
    pub fn decode_line(&self, bytes: &[u8]) -> Result<String, WireProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            warn!(error = %e, size = bytes.len(), "Received line is not valid UTF-8");
            WireProtocolError::malformed(format!("invalid UTF-8: {}", e))
        })?;
        Ok(text.trim_end().to_string())
    }

    /// Read the next line from `reader`.
    ///
    /// Returns `Ok(None)` at end of stream, which is distinct from an empty line.
    #[instrument(level = "trace", skip(self, reader), fields(max_length = self.wire_config.max_line_length))]
    pub async fn read_line(
        &self,
        reader: &mut (impl AsyncBufRead + Unpin),
    ) -> Result<Option<String>, WireProtocolError> {
        let max_length = self.wire_config.max_line_length;
        let mut buffer = Vec::new();

        let read = (&mut *reader)
            .take(max_length as u64 + 2)
            .read_until(LINE_TERMINATOR, &mut buffer)
            .await?;

        if read == 0 {
            debug!("Peer closed the stream");
            return Ok(None);
        }

        if content_length(&buffer) > max_length {
            warn!(max_length, "Line exceeds maximum length");
            return Err(WireProtocolError::LineTooLong { max_length });
        }

        trace!("Read {} byte line", read);
        self.decode_line(&buffer).map(Some)
    }

    /// Write one already-encoded frame and flush it.
    #[instrument(level = "trace", skip(self, writer, frame), fields(frame_size = frame.len()))]
    pub async fn write_frame(
        &self,
        writer: &mut (impl AsyncWrite + Unpin),
        frame: &[u8],
    ) -> Result<(), WireProtocolError> {
        writer.write_all(frame).await?;
        writer.flush().await?;
        trace!("Wrote {} byte frame", frame.len());
        Ok(())
    }
}
