use bytes::Bytes;

use crate::error::{Result, SyncError};
use crate::packet::{MessageId, UnverifiedMessage};

/// A message whose integrity has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    id: MessageId,
    raw: Bytes,
}

impl VerifiedMessage {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw
    }
}

/// Checks messages received in [`Packet::Message`](crate::Packet::Message)
/// packets before they are stored or acknowledged.
///
/// Message serialization and signature schemes live above the sync layer, so
/// they plug in here.
pub trait MessageVerifier: Send + Sync {
    /// Verify `message`. A rejected message is a format error: the peer sent
    /// bytes that do not form a valid message.
    fn verify(&self, message: UnverifiedMessage) -> Result<VerifiedMessage>;
}

/// Accepts any message no longer than `max_length` and identifies it by its
/// SHA-256 digest.
#[derive(Debug, Clone)]
pub struct DigestVerifier {
    max_length: usize,
}

impl DigestVerifier {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl MessageVerifier for DigestVerifier {
    fn verify(&self, message: UnverifiedMessage) -> Result<VerifiedMessage> {
        let len = message.as_bytes().len();
        if len > self.max_length {
            return Err(SyncError::format(format!(
                "message is {len} bytes, max {}",
                self.max_length
            )));
        }
        Ok(VerifiedMessage {
            id: message.id(),
            raw: message.into_bytes(),
        })
    }
}
