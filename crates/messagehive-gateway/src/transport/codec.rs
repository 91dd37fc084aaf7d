//! Frame <-> envelope conversion for the WebSocket transport.
//!
//! Client frames are JSON envelopes. The sender is always the authenticated
//! identity, whatever the frame claims, and gateway-internal classification
//! bits are stripped.

use serde_json::json;

use messagehive_core::error::{HiveError, Result};
use messagehive_core::protocol::envelope::unix_now;
use messagehive_core::protocol::{Classification, Envelope};

pub fn decode_frame(text: &str, uid: &str) -> Result<Envelope> {
    let mut env = Envelope::decode_json(text)?;
    if env.recipient_id.is_empty() {
        return Err(HiveError::BadRequest("rid must not be empty".into()));
    }
    env.sender_id = uid.to_string();
    env.classification = env.classification.external();
    if env.sent_at == 0 {
        env.sent_at = unix_now();
    }
    Ok(env)
}

pub fn encode_frame(env: &Envelope) -> Result<String> {
    env.encode_json()
}

/// Presence envelope pushed by the transport itself (ONLINE / OFFLINE).
pub fn lifecycle_envelope(uid: &str, bit: u32) -> Envelope {
    Envelope::new("", uid, "", Classification::empty().with(bit), "")
}

pub fn sys_authed_json(uid: &str) -> String {
    json!({
        "svc": "sys",
        "type": "authed",
        "data": { "uid": uid }
    })
    .to_string()
}

pub fn sys_error_json(code: &str, msg: &str) -> String {
    json!({
        "svc": "sys",
        "type": "error",
        "data": { "code": code, "msg": msg }
    })
    .to_string()
}
