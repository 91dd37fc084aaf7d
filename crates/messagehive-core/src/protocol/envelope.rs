//! Envelope: the canonical routed message record.
//!
//! JSON wire names are short (`mid`, `sid`, `rid`, `type`, `stime`, `body`);
//! every field is optional on input and defaults to its empty value.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};
use crate::protocol::Classification;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Caller-assigned id, echoed in acknowledgements.
    #[serde(rename = "mid", default)]
    pub message_id: String,
    #[serde(rename = "sid", default)]
    pub sender_id: String,
    /// User or group identity.
    #[serde(rename = "rid", default)]
    pub recipient_id: String,
    #[serde(rename = "type", default)]
    pub classification: Classification,
    /// Unix seconds.
    #[serde(rename = "stime", default)]
    pub sent_at: i64,
    /// Opaque payload; JSON only when the GROUP bit is set.
    #[serde(default)]
    pub body: String,

    /// Failed direct-delivery attempts so far. Never leaves the process.
    #[serde(skip)]
    pub attempts: u32,
}

impl Envelope {
    pub fn new(
        message_id: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        classification: Classification,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            classification,
            sent_at: unix_now(),
            body: body.into(),
            attempts: 0,
        }
    }

    /// Candidate acknowledgement: same id, addressed back to the sender,
    /// no classification and an empty body.
    pub fn acknowledgement_for(original: &Envelope) -> Self {
        Self {
            message_id: original.message_id.clone(),
            sender_id: String::new(),
            recipient_id: original.sender_id.clone(),
            classification: Classification::empty(),
            sent_at: unix_now(),
            body: String::new(),
            attempts: 0,
        }
    }

    /// Copy of this envelope addressed to `recipient` (group fan-out).
    pub fn readdressed(&self, recipient: &str) -> Self {
        Self {
            recipient_id: recipient.to_string(),
            attempts: 0,
            ..self.clone()
        }
    }

    pub fn decode_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| HiveError::Decode(format!("invalid envelope json: {e}")))
    }

    pub fn encode_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| HiveError::Internal(format!("envelope encode failed: {e}")))
    }
}

/// Current unix time in seconds (0 if the clock is before the epoch).
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
