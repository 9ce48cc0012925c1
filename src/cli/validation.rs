//! Input validation for values that end up on the wire.
//!
//! Every protocol value is sent as a single line, so a stray newline would desync the
//! handshake. These checks run before any connection is opened.

use crate::error::{ChatError, Result};
use crate::messages::wire::collapse_newlines;

pub const MAX_NICKNAME_LENGTH: usize = 64;

fn single_line<'a>(setting: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ChatError::configuration(setting, "must not be empty"));
    }
    if trimmed.contains(['\n', '\r']) {
        return Err(ChatError::configuration(
            setting,
            "must be a single line of text",
        ));
    }
    Ok(trimmed)
}

pub fn validate_nickname(nickname: &str) -> Result<String> {
    let nickname = single_line("nickname", nickname)?;
    if nickname.chars().count() > MAX_NICKNAME_LENGTH {
        return Err(ChatError::configuration(
            "nickname",
            format!("must be at most {} characters", MAX_NICKNAME_LENGTH),
        ));
    }
    Ok(nickname.to_string())
}

pub fn validate_token(token: &str) -> Result<String> {
    let token = single_line("token", token)?;
    if token.chars().any(char::is_whitespace) {
        return Err(ChatError::configuration("token", "must not contain spaces"));
    }
    Ok(token.to_string())
}

/// A message is usable if anything is left once blank lines are collapsed.
pub fn validate_message(message: &str) -> Result<()> {
    if collapse_newlines(message).trim().is_empty() {
        return Err(ChatError::configuration("message", "must not be empty"));
    }
    Ok(())
}
