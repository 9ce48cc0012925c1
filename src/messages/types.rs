use crate::messages::wire::WireProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account details handed out by the server on registration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub nickname: String,
    pub account_hash: String,
}

impl Credentials {
    /// The token to present when authorising later sessions
    pub fn token(&self) -> &str {
        &self.account_hash
    }
}

/// Result of presenting a token to the server
#[derive(Debug, Clone, PartialEq)]
pub enum Authorisation {
    /// Token accepted; carries the account record the server replied with
    Granted(Value),
    /// The server answered null/empty: the token is unknown
    Rejected,
}

impl Authorisation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorisation::Granted(_))
    }
}

/// Parse a one-line JSON reply from the server.
pub fn parse_reply(line: &str) -> Result<Value, WireProtocolError> {
    serde_json::from_str(line)
        .map_err(|e| WireProtocolError::malformed(format!("expected a JSON reply: {}", e)))
}

/// JSON "falsiness": null, false, zero, and empty strings/arrays/objects.
pub fn is_empty_reply(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Interpret a registration reply; `None` when the server declined.
pub fn credentials_from_reply(value: Value) -> Result<Option<Credentials>, WireProtocolError> {
    if is_empty_reply(&value) {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| WireProtocolError::malformed(format!("unexpected registration reply: {}", e)))
}

/// Interpret an authorisation reply.
pub fn authorisation_from_reply(value: Value) -> Authorisation {
    if is_empty_reply(&value) {
        Authorisation::Rejected
    } else {
        Authorisation::Granted(value)
    }
}
