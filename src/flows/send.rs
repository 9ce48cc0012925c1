//! Registration, authorisation and message submission.
//!
//! The handshake helpers take a [`LineStream`] directly so they can run inside any
//! session scope; [`SendFlow`] wires them to two independent sessions.

use crate::cli::validation::{validate_message, validate_nickname, validate_token};
use crate::error::{ChatError, Result};
use crate::events::EventSink;
use crate::messages::types::{
    authorisation_from_reply, credentials_from_reply, parse_reply, Authorisation, Credentials,
};
use crate::messages::wire::{collapse_newlines, LineCodec};
use crate::network::{Connector, LineStream, ResilientSession, RetryPolicy, TcpConnector};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, instrument, warn};

pub const REGISTRATION_FAILED: &str = "Problems with new user registration. Try again later";
pub const UNKNOWN_TOKEN: &str = "Unknown token. Check it, or register new user";
pub const MISSING_TOKEN: &str = "either a nickname to register or an auth token is required";

/// Register `nickname`; `None` if the server declined.
#[instrument(level = "debug", skip(lines, sink))]
pub async fn register<S>(
    lines: &mut LineStream<S>,
    nickname: &str,
    sink: &dyn EventSink,
) -> Result<Option<Credentials>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    sink.record(&lines.expect_line("registration greeting").await?);
    lines.write_line("").await?;
    sink.record(&lines.expect_line("nickname prompt").await?);
    lines.write_line(nickname).await?;

    let reply = lines.expect_line("registration reply").await?;
    sink.record(&reply);
    Ok(credentials_from_reply(parse_reply(&reply)?)?)
}

/// Present `token`; an unknown token is `Authorisation::Rejected`, not an error.
#[instrument(level = "debug", skip(lines, token, sink))]
pub async fn authorise<S>(
    lines: &mut LineStream<S>,
    token: &str,
    sink: &dyn EventSink,
) -> Result<Authorisation>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    sink.record(&lines.expect_line("token prompt").await?);
    lines.write_line(token).await?;

    let reply = lines.expect_line("authorisation reply").await?;
    let authorisation = authorisation_from_reply(parse_reply(&reply)?);
    if authorisation.is_granted() {
        sink.record(&reply);
    }
    Ok(authorisation)
}

/// Submit one message after a successful authorisation; returns the server's ack.
#[instrument(level = "debug", skip(lines, message, sink))]
pub async fn submit_message<S>(
    lines: &mut LineStream<S>,
    message: &str,
    sink: &dyn EventSink,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    sink.record(&lines.expect_line("message prompt").await?);
    lines.write_message(message).await?;
    sink.record(&collapse_newlines(message));

    let acknowledgement = lines.expect_line("message acknowledgement").await?;
    sink.record(&acknowledgement);
    Ok(acknowledgement)
}

/// How the sender identifies itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    Register { nickname: String },
    Token(String),
}

#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub nickname: Option<String>,
    pub token: Option<String>,
    pub message: String,
}

impl SendRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Validate everything that can be checked locally.
    ///
    /// A nickname takes priority over a token: it registers a fresh account.
    pub fn login(&self) -> Result<Login> {
        validate_message(&self.message)?;
        match (&self.nickname, &self.token) {
            (Some(nickname), _) => Ok(Login::Register {
                nickname: validate_nickname(nickname)?,
            }),
            (None, Some(token)) => Ok(Login::Token(validate_token(token)?)),
            (None, None) => Err(ChatError::configuration("token", MISSING_TOKEN)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Set when the flow registered a new account
    pub registered: Option<Credentials>,
    pub acknowledgement: String,
}

/// Optional registration, then authorisation and submission over separate sessions
pub struct SendFlow<C: Connector = TcpConnector> {
    host: String,
    port: u16,
    connector: Arc<C>,
    policy: RetryPolicy,
    codec: LineCodec,
    sink: Arc<dyn EventSink>,
}

impl SendFlow<TcpConnector> {
    pub fn new(host: impl Into<String>, port: u16, sink: Arc<dyn EventSink>) -> Self {
        Self::with_connector(host, port, TcpConnector, sink)
    }
}

impl<C: Connector> SendFlow<C> {
    pub fn with_connector(
        host: impl Into<String>,
        port: u16,
        connector: C,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connector: Arc::new(connector),
            policy: RetryPolicy::default(),
            codec: LineCodec::default(),
            sink,
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

    fn open_session(&self) -> ResilientSession<Arc<C>> {
        ResilientSession::with_connector(
            self.host.clone(),
            self.port,
            Arc::clone(&self.connector),
            Arc::clone(&self.sink),
        )
        .with_policy(self.policy.clone())
        .with_codec(self.codec.clone())
    }

    /// Run the whole send handshake. Local validation happens before any connect.
    #[instrument(level = "debug", skip(self, request), fields(host = %self.host, port = self.port))]
    pub async fn run(&self, request: SendRequest) -> Result<SendReport> {
        let (registered, token) = match request.login()? {
            Login::Register { nickname } => {
                let credentials = self.register_account(&nickname).await?;
                let token = credentials.account_hash.clone();
                (Some(credentials), token)
            }
            Login::Token(token) => (None, token),
        };

        let acknowledgement = self.deliver(&token, &request.message).await?;
        Ok(SendReport {
            registered,
            acknowledgement,
        })
    }

    /// Register a new account over its own session.
    pub async fn register_account(&self, nickname: &str) -> Result<Credentials> {
        let sink = Arc::clone(&self.sink);
        let nickname = nickname.to_string();

        let credentials = self
            .open_session()
            .with_session(move |lines| {
                Box::pin(async move { register(lines, &nickname, sink.as_ref()).await })
            })
            .await?;

        match credentials {
            Some(credentials) => {
                info!(nickname = %credentials.nickname, "Registered new account");
                Ok(credentials)
            }
            None => {
                warn!("Server declined the registration");
                self.sink.record(REGISTRATION_FAILED);
                Err(ChatError::ProtocolRejection(REGISTRATION_FAILED.to_string()))
            }
        }
    }

    /// Authorise with `token` and submit `message` over one session.
    pub async fn deliver(&self, token: &str, message: &str) -> Result<String> {
        let sink = Arc::clone(&self.sink);
        let token = token.to_string();
        let message = message.to_string();

        let acknowledgement = self
            .open_session()
            .with_session(move |lines| {
                Box::pin(async move {
                    match authorise(lines, &token, sink.as_ref()).await? {
                        Authorisation::Granted(_) => {
                            submit_message(lines, &message, sink.as_ref()).await.map(Some)
                        }
                        Authorisation::Rejected => Ok(None),
                    }
                })
            })
            .await?;

        match acknowledgement {
            Some(acknowledgement) => {
                info!("Message delivered");
                Ok(acknowledgement)
            }
            None => {
                warn!("Server rejected the auth token");
                self.sink.record(UNKNOWN_TOKEN);
                Err(ChatError::ProtocolRejection(UNKNOWN_TOKEN.to_string()))
            }
        }
    }
}
