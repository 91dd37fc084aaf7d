//! Group-action body codec.
//!
//! Envelopes classified as GROUP carry a JSON body of the form
//! `{"action": "...", "data": ...}`. Decoding is lenient:
//! - `data` string  => `data`
//! - `data` array   => `members`, consumed up to (not including) the first
//!   non-string element; a mixed array is not an error
//! - anything else  => neither
//!
//! Only the first JSON value in the body is read; trailing bytes are ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{HiveError, Result};

pub const ACTION_JOIN: &str = "join";
pub const ACTION_INVITE: &str = "invite";
pub const ACTION_SEND: &str = "send";
pub const ACTION_LEAVE: &str = "leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupActionKind {
    Join,
    Invite,
    Send,
    Leave,
    /// Unrecognized or absent action; carries the raw string.
    Unknown(String),
}

impl Default for GroupActionKind {
    fn default() -> Self {
        GroupActionKind::Unknown(String::new())
    }
}

impl GroupActionKind {
    pub fn parse(s: &str) -> Self {
        match s {
            ACTION_JOIN => GroupActionKind::Join,
            ACTION_INVITE => GroupActionKind::Invite,
            ACTION_SEND => GroupActionKind::Send,
            ACTION_LEAVE => GroupActionKind::Leave,
            other => GroupActionKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GroupActionKind::Join => ACTION_JOIN,
            GroupActionKind::Invite => ACTION_INVITE,
            GroupActionKind::Send => ACTION_SEND,
            GroupActionKind::Leave => ACTION_LEAVE,
            GroupActionKind::Unknown(s) => s,
        }
    }
}

/// Decoded group-action request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupAction {
    pub action: GroupActionKind,
    /// Used by join / invite / leave.
    pub members: Vec<String>,
    /// Used by send.
    pub data: String,
}

#[derive(Debug, Deserialize)]
struct RawGroupBody {
    #[serde(default)]
    action: String,
    #[serde(default)]
    data: Value,
}

impl GroupAction {
    pub fn decode(body: &str) -> Result<Self> {
        let raw: RawGroupBody = serde_json::Deserializer::from_str(body)
            .into_iter::<RawGroupBody>()
            .next()
            .ok_or_else(|| HiveError::Decode("empty group body".into()))?
            .map_err(|e| HiveError::Decode(format!("invalid group body: {e}")))?;

        let mut out = GroupAction {
            action: GroupActionKind::parse(&raw.action),
            ..GroupAction::default()
        };

        match raw.data {
            Value::String(s) => out.data = s,
            Value::Array(items) => {
                out.members = items
                    .into_iter()
                    .map_while(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
            }
            _ => {}
        }

        Ok(out)
    }

    /// Fixed acknowledgement body for a completed membership action.
    pub fn success_body(kind: &GroupActionKind) -> Option<&'static str> {
        match kind {
            GroupActionKind::Join => Some(r#"{"action":"join","data":"succeed"}"#),
            GroupActionKind::Invite => Some(r#"{"action":"invite","data":"succeed"}"#),
            GroupActionKind::Leave => Some(r#"{"action":"leave","data":"succeed"}"#),
            _ => None,
        }
    }
}
