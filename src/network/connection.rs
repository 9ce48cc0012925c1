use crate::messages::wire::{LineCodec, WireProtocolError};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Opens transports for a session. `TcpConnector` in production; tests script it.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    type Stream = C::Stream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream> {
        (**self).connect(host, port).await
    }
}

/// Plain TCP
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not disable Nagle's algorithm");
        }
        Ok(stream)
    }
}

/// Line-oriented view of a live connection
pub struct LineStream<S> {
    inner: BufReader<S>,
    codec: LineCodec,
    lines_received: u64,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineStream<S> {
    pub fn new(stream: S, codec: LineCodec) -> Self {
        Self {
            inner: BufReader::new(stream),
            codec,
            lines_received: 0,
        }
    }

    /// Next line from the peer, or `None` once it closed the stream
    pub async fn read_line(&mut self) -> Result<Option<String>, WireProtocolError> {
        let line = self.codec.read_line(&mut self.inner).await?;
        if line.is_some() {
            self.lines_received += 1;
        }
        Ok(line)
    }

    /// Next line, treating end of stream as a dropped connection
    pub async fn expect_line(&mut self, operation: &str) -> Result<String, WireProtocolError> {
        self.read_line()
            .await?
            .ok_or_else(|| WireProtocolError::UnexpectedEof {
                operation: operation.to_string(),
            })
    }

    #[instrument(level = "trace", skip(self, text))]
    pub async fn write_line(&mut self, text: &str) -> Result<(), WireProtocolError> {
        let frame = self.codec.encode_line(text);
        self.codec.write_frame(&mut self.inner, &frame).await
    }

    /// Send a chat message terminated by a blank line
    #[instrument(level = "trace", skip(self, text))]
    pub async fn write_message(&mut self, text: &str) -> Result<(), WireProtocolError> {
        let frame = self.codec.encode_message(text);
        self.codec.write_frame(&mut self.inner, &frame).await
    }

    pub fn lines_received(&self) -> u64 {
        self.lines_received
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.get_mut().shutdown().await
    }
}
