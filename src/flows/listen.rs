use crate::error::{ChatError, Result};
use crate::network::{Connector, ResilientSession, TcpConnector};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Relays every server line to the session's event sink, reconnecting forever
pub struct ListenFlow<C: Connector = TcpConnector> {
    session: ResilientSession<C>,
    reconnect_delay: Duration,
}

impl<C: Connector> ListenFlow<C> {
    /// The pause between sessions defaults to the session's retry delay
    pub fn new(session: ResilientSession<C>) -> Self {
        let reconnect_delay = session.policy().attempt_delay;
        Self {
            session,
            reconnect_delay,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn session(&self) -> &ResilientSession<C> {
        &self.session
    }

    /// Relay lines over a single session until the server closes the stream.
    ///
    /// Returns the number of lines relayed.
    #[instrument(level = "debug", skip(self))]
    pub async fn relay_once(&mut self) -> Result<u64> {
        let sink = self.session.sink();
        self.session
            .with_session(move |lines| {
                Box::pin(async move {
                    let mut relayed = 0u64;
                    while let Some(line) = lines.read_line().await? {
                        sink.record(&line);
                        relayed += 1;
                    }
                    Ok::<_, ChatError>(relayed)
                })
            })
            .await
    }

    /// Run until the future is dropped.
    pub async fn run(&mut self) {
        loop {
            match self.relay_once().await {
                Ok(relayed) => info!(relayed, "Server closed the stream"),
                // The session already reported these to the sink.
                Err(e) if e.is_network() => {
                    warn!(error = %e, "Listener lost its connection");
                }
                Err(e) => {
                    warn!(error = %e, "Listener session failed");
                    self.session.sink().record(&format!("Listener error: {}", e));
                }
            }

            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
