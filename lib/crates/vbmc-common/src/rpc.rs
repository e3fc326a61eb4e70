//! Wire format of the supervisor control protocol.
//!
//! One UTF-8 JSON document per message. A request is a single flat mapping
//! holding the `command` name next to that command's options:
//!
//! ```json
//! { "command": "start", "names": ["bmc1", "bmc2"] }
//! ```
//!
//! A response carries an `rc` status plus either a free-form `msg` or a
//! `header`/`rows` table:
//!
//! ```json
//! { "rc": 0, "header": ["name", "status"], "rows": [["bmc1", "running"]] }
//! { "rc": 2, "msg": "BMC instance 'bmc9' not found" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BmcError;
use crate::types::AddOptions;

/// Commands the supervisor understands.
pub const KNOWN_COMMANDS: &[&str] = &["add", "delete", "start", "stop", "list", "show"];

/// Upper bound on the size of one encoded message.
pub const MAX_MESSAGE_BYTES: u64 = 1024 * 1024;

/// Why a message could not be decoded.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("request has no 'command' field")]
    MissingCommand,

    #[error("unknown command '{0}' (expected one of: {list})", list = KNOWN_COMMANDS.join(", "))]
    UnknownCommand(String),

    #[error("invalid options for command '{command}': {reason}")]
    InvalidOptions { command: String, reason: String },
}

/// A decoded control request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Request {
    Add(AddOptions),
    Delete { names: Vec<String> },
    Start { names: Vec<String> },
    Stop { names: Vec<String> },
    List,
    Show { name: String },
}

impl Request {
    /// Name of the command as it appears on the wire.
    #[must_use]
    pub fn command(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Delete { .. } => "delete",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::List => "list",
            Self::Show { .. } => "show",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(|e| WireError::Malformed(e.to_string()))
    }

    /// Decode a request, distinguishing a missing or unknown command from
    /// bad options so the caller can report something useful.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| WireError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(WireError::Malformed("request is not a mapping".into()));
        }
        let command = value
            .get("command")
            .and_then(serde_json::Value::as_str)
            .ok_or(WireError::MissingCommand)?
            .to_string();
        if !KNOWN_COMMANDS.contains(&command.as_str()) {
            return Err(WireError::UnknownCommand(command));
        }
        serde_json::from_value(value).map_err(|e| WireError::InvalidOptions {
            command,
            reason: e.to_string(),
        })
    }
}

/// Free-form response message: one string or a list of lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Message {
    Text(String),
    Lines(Vec<String>),
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Lines(lines) => f.write_str(&lines.join("\n")),
        }
    }
}

/// A control response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub rc: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<String>>>,
}

impl Response {
    /// Successful scalar result with no message.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            rc: 0,
            msg: Some(Message::Text(String::new())),
            ..Self::default()
        }
    }

    /// Successful tabular result.
    #[must_use]
    pub fn table(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            rc: 0,
            msg: None,
            header: Some(header),
            rows: Some(rows),
        }
    }

    /// Failed result with a single-line message.
    #[must_use]
    pub fn error(rc: i32, msg: impl Into<String>) -> Self {
        Self {
            rc,
            msg: Some(Message::Text(msg.into())),
            ..Self::default()
        }
    }

    /// Failed result with one line per failure.
    #[must_use]
    pub fn errors(rc: i32, lines: Vec<String>) -> Self {
        Self {
            rc,
            msg: Some(Message::Lines(lines)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.rc == 0
    }

    /// The message as display text, empty when absent.
    #[must_use]
    pub fn message(&self) -> String {
        self.msg.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(|e| WireError::Malformed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(|e| WireError::Malformed(e.to_string()))
    }
}

impl From<&BmcError> for Response {
    fn from(e: &BmcError) -> Self {
        Self::error(e.rc(), e.to_string())
    }
}

impl From<&WireError> for Response {
    fn from(e: &WireError) -> Self {
        Self::error(1, e.to_string())
    }
}
