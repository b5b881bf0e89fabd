//! Chat messages in their three lifecycle forms.
//!
//! A [`Message`] is what a caller submits. The cipher stage turns it into an
//! [`EncryptedMessage`], which is the only form the pending buffer accepts
//! (wrapped as a [`PendingMessage`] so it can age). Mining keeps nothing but
//! the [`MessageMetadata`].

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Fixed per-message overhead in size estimates (the timestamp).
const TIMESTAMP_SIZE: u64 = 8;

/// A raw message as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub receiver: String,
    pub content: Vec<u8>,
    /// Set by the ingestion pipeline on arrival. Aging priority is tracked
    /// on [`PendingMessage`], not here.
    #[serde(default)]
    pub submitted_at: Timestamp,
}

impl Message {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
            submitted_at: Timestamp::EPOCH,
        }
    }

    /// Stamp the arrival time.
    pub fn stamped(mut self, at: Timestamp) -> Self {
        self.submitted_at = at;
        self
    }

    /// The bytes handed to the cipher: `"{sender}->{receiver}: {content}"`.
    pub fn sealing_plaintext(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(self.sender.len() + self.receiver.len() + self.content.len() + 4);
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(b"->");
        out.extend_from_slice(self.receiver.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&self.content);
        out
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata::new(self.sender.clone(), self.receiver.clone(), self.submitted_at)
    }
}

/// A message whose content has been replaced by AEAD ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub sender: String,
    pub receiver: String,
    /// Nonce-prefixed ciphertext.
    pub ciphertext: Vec<u8>,
    pub submitted_at: Timestamp,
}

impl EncryptedMessage {
    /// Pair a raw message with its ciphertext, dropping the plaintext.
    pub fn seal(message: Message, ciphertext: Vec<u8>) -> Self {
        Self {
            sender: message.sender,
            receiver: message.receiver,
            ciphertext,
            submitted_at: message.submitted_at,
        }
    }

    /// Estimated on-chain footprint: sender + receiver + timestamp + ciphertext.
    pub fn estimated_size(&self) -> u64 {
        (self.sender.len() + self.receiver.len() + self.ciphertext.len()) as u64 + TIMESTAMP_SIZE
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata::new(self.sender.clone(), self.receiver.clone(), self.submitted_at)
    }
}

/// An encrypted message waiting in the pending buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMessage {
    pub message: EncryptedMessage,
    pub priority: u64,
}

impl PendingMessage {
    pub fn new(message: EncryptedMessage) -> Self {
        Self {
            message,
            priority: 0,
        }
    }
}

/// The non-sensitive part of a message that is recorded in a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub sender: String,
    pub receiver: String,
    pub submitted_at: Timestamp,
}

impl MessageMetadata {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        submitted_at: Timestamp,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            submitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealing_plaintext_format() {
        let msg = Message::new("alice", "bob", "hi there");
        assert_eq!(msg.sealing_plaintext(), b"alice->bob: hi there".to_vec());
    }

    #[test]
    fn stamped_sets_arrival_and_new_pending_starts_at_zero() {
        let msg = Message::new("a", "b", "x").stamped(Timestamp::from_millis(99));
        assert_eq!(msg.submitted_at, Timestamp::from_millis(99));
        let pending = PendingMessage::new(EncryptedMessage::seal(msg, vec![1, 2, 3]));
        assert_eq!(pending.priority, 0);
    }

    #[test]
    fn seal_drops_plaintext_and_keeps_metadata() {
        let msg = Message::new("alice", "bob", "secret").stamped(Timestamp::from_millis(5));
        let sealed = EncryptedMessage::seal(msg.clone(), vec![0u8; 40]);
        assert_eq!(sealed.metadata(), msg.metadata());
        assert_eq!(sealed.ciphertext.len(), 40);
        // 5 + 3 + 8 + 40
        assert_eq!(sealed.estimated_size(), 56);
    }

    #[test]
    fn missing_stamp_fields_deserialize_to_defaults() {
        let msg: Message =
            serde_json::from_str(r#"{"sender":"a","receiver":"b","content":[104,105]}"#).unwrap();
        assert_eq!(msg.submitted_at, Timestamp::EPOCH);
        assert_eq!(msg.content, b"hi".to_vec());
    }
}
