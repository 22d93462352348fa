//! Edit-lock protocol messages
//!
//! Four message kinds travel between tabs, each naming a file and carrying
//! the sender's tab id and a wall-clock timestamp. Frames are CBOR encoded.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Identifies one execution context (tab) on the bus
pub type TabId = String;

/// Protocol message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Sender now holds the file
    Claim,
    /// Sender gave the file up
    Release,
    /// Sender still holds the file
    Heartbeat,
    /// Sender asks whether anyone holds the file
    Query,
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMessage {
    pub kind: MessageKind,
    #[serde(rename = "fileId")]
    pub file_id: String,
    /// Milliseconds since the Unix epoch
    pub ts: i64,
    #[serde(rename = "senderId")]
    pub sender: TabId,
}

impl LockMessage {
    /// Create a message stamped with the current time
    pub fn new(kind: MessageKind, file_id: impl Into<String>, sender: impl Into<TabId>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
            ts: Utc::now().timestamp_millis(),
            sender: sender.into(),
        }
    }

    pub fn claim(file_id: impl Into<String>, sender: impl Into<TabId>) -> Self {
        Self::new(MessageKind::Claim, file_id, sender)
    }

    pub fn release(file_id: impl Into<String>, sender: impl Into<TabId>) -> Self {
        Self::new(MessageKind::Release, file_id, sender)
    }

    pub fn heartbeat(file_id: impl Into<String>, sender: impl Into<TabId>) -> Self {
        Self::new(MessageKind::Heartbeat, file_id, sender)
    }

    pub fn query(file_id: impl Into<String>, sender: impl Into<TabId>) -> Self {
        Self::new(MessageKind::Query, file_id, sender)
    }

    /// Encode message to CBOR bytes
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| CoreError::Encoding(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_message_encoding() {
        let msg = LockMessage::claim("interview-3", "tab-a");
        let bytes = msg.encode().unwrap();
        assert!(!bytes.is_empty());

        let decoded = LockMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.kind, MessageKind::Claim);
    }

    #[test]
    fn test_timestamp_is_recent() {
        let before = Utc::now().timestamp_millis();
        let msg = LockMessage::heartbeat("f", "tab-a");
        assert!(msg.ts >= before);
    }

    #[test]
    fn test_wire_field_names() {
        #[derive(Deserialize)]
        struct Raw {
            kind: String,
            #[serde(rename = "fileId")]
            file_id: String,
            #[serde(rename = "senderId")]
            sender_id: String,
        }

        let bytes = LockMessage::query("doc-9", "tab-b").encode().unwrap();
        let raw: Raw = ciborium::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(raw.kind, "QUERY");
        assert_eq!(raw.file_id, "doc-9");
        assert_eq!(raw.sender_id, "tab-b");
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let err = LockMessage::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, CoreError::Encoding(_)));
    }
}
