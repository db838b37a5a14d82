//! Wire types for the one-command-per-connection socket protocol.
//!
//! Primary form: `{"cmd": "add", "msg": "<text>"}` or `{"cmd": "ping"}`.
//! Legacy form: plain `ADD <text>` (prefix case-insensitive).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest command accepted; read in a single receive.
pub const MAX_COMMAND_BYTES: usize = 4096;

const LEGACY_ADD_PREFIX: &str = "ADD ";

/// Structured request as sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Request {
    pub fn add(message: impl Into<String>) -> Self {
        Self {
            cmd: "add".to_string(),
            msg: Some(message.into()),
        }
    }

    pub fn ping() -> Self {
        Self {
            cmd: "ping".to_string(),
            msg: None,
        }
    }
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Trimmed, never empty.
    Add(String),
    Ping,
    Invalid,
}

impl Command {
    /// Structured decode first; only if that fails, the legacy text form.
    /// Bytes that are not valid UTF-8 are never repaired.
    pub fn decode(raw: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(raw) else {
            return Self::Invalid;
        };
        let text = text.trim();
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => match serde_json::from_value::<Request>(value) {
                Ok(request) => Self::from_request(request),
                Err(_) => Self::from_legacy(text),
            },
            _ => Self::from_legacy(text),
        }
    }

    fn from_request(request: Request) -> Self {
        match request.cmd.as_str() {
            "add" => request
                .msg
                .as_deref()
                .map(str::trim)
                .filter(|msg| !msg.is_empty())
                .map_or(Self::Invalid, |msg| Self::Add(msg.to_string())),
            "ping" => Self::Ping,
            _ => Self::Invalid,
        }
    }

    fn from_legacy(text: &str) -> Self {
        let is_add = text
            .get(..LEGACY_ADD_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(LEGACY_ADD_PREFIX));
        if !is_add {
            return Self::Invalid;
        }
        let msg = text[LEGACY_ADD_PREFIX.len()..].trim();
        if msg.is_empty() {
            Self::Invalid
        } else {
            Self::Add(msg.to_string())
        }
    }
}

/// One reply per connection, newline-terminated on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn queued() -> Self {
        Self {
            ok: true,
            message: Some("queued".to_string()),
            error: None,
        }
    }

    pub fn invalid() -> Self {
        Self::rejected("invalid command")
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: None,
            error: Some(reason.into()),
        }
    }

    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
