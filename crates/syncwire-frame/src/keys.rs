//! Per-connection key schedule.
//!
//! Both ends share one [`SecretKey`]. Each direction of a connection is a
//! separate stream keyed by the sender's role, so the two directions never
//! share a key even though both start counting frames at zero:
//!
//! ```text
//! frame key = HKDF-SHA256(secret, "syncwire/v1/frame" || role || stream number BE)
//! tag key   = HKDF-SHA256(secret, "syncwire/v1/tag" || role)
//! tag       = Poly1305 tag of an empty message under the tag key,
//!             nonce = stream number BE || 4 zero bytes
//! ```

use std::fmt;

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use syncwire_transport::{ContactId, TransportId};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::encode_iv;
use crate::constants::{KEY_LENGTH, TAG_LENGTH};

const FRAME_KEY_LABEL: &[u8] = b"syncwire/v1/frame";
const TAG_KEY_LABEL: &[u8] = b"syncwire/v1/tag";

/// Symmetric key material. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LENGTH]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse a key from a slice of exactly [`KEY_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_LENGTH] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Which end of the connection a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn from_initiator(initiator: bool) -> Self {
        if initiator {
            Role::Initiator
        } else {
            Role::Responder
        }
    }

    /// The role of the other end.
    pub fn peer(self) -> Self {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Role::Initiator => 0,
            Role::Responder => 1,
        }
    }
}

fn expand(secret: &SecretKey, info: &[u8]) -> SecretKey {
    let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
    let mut okm = [0u8; KEY_LENGTH];
    hk.expand(info, &mut okm)
        .expect("32 bytes is valid output length for SHA-256 HKDF");
    let key = SecretKey(okm);
    okm.zeroize();
    key
}

/// Derive the frame key for the stream sent by `sender`.
pub fn derive_frame_key(secret: &SecretKey, sender: Role, stream_number: u64) -> SecretKey {
    let mut info = Vec::with_capacity(FRAME_KEY_LABEL.len() + 1 + 8);
    info.extend_from_slice(FRAME_KEY_LABEL);
    info.push(sender.as_byte());
    info.extend_from_slice(&stream_number.to_be_bytes());
    expand(secret, &info)
}

/// Derive the key used to compute stream tags for `sender`.
pub fn derive_tag_key(secret: &SecretKey, sender: Role) -> SecretKey {
    let mut info = Vec::with_capacity(TAG_KEY_LABEL.len() + 1);
    info.extend_from_slice(TAG_KEY_LABEL);
    info.push(sender.as_byte());
    expand(secret, &info)
}

/// Compute the tag that opens stream `stream_number`.
pub fn encode_tag(tag_key: &SecretKey, stream_number: u64) -> [u8; TAG_LENGTH] {
    let cipher = ChaCha20Poly1305::new(tag_key.as_bytes().into());
    let iv = encode_iv(stream_number);
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), &[], &mut [])
        .expect("sealing an empty message cannot exceed the cipher limit");
    let mut out = [0u8; TAG_LENGTH];
    out.copy_from_slice(&tag);
    out
}

/// Everything needed to encrypt or decrypt the streams of one connection.
///
/// `stream_number` selects fresh frame keys for each connection made with the
/// same secret, since frame numbers restart at zero on every stream.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    contact_id: ContactId,
    transport_id: TransportId,
    secret: SecretKey,
    stream_number: u64,
    initiator: bool,
}

impl ConnectionContext {
    pub fn new(
        contact_id: ContactId,
        transport_id: TransportId,
        secret: SecretKey,
        stream_number: u64,
        initiator: bool,
    ) -> Self {
        Self {
            contact_id,
            transport_id,
            secret,
            stream_number,
            initiator,
        }
    }

    pub fn contact_id(&self) -> ContactId {
        self.contact_id
    }

    pub fn transport_id(&self) -> &TransportId {
        &self.transport_id
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn stream_number(&self) -> u64 {
        self.stream_number
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn role(&self) -> Role {
        Role::from_initiator(self.initiator)
    }

    /// Key for frames this end sends.
    pub fn outgoing_frame_key(&self) -> SecretKey {
        derive_frame_key(&self.secret, self.role(), self.stream_number)
    }

    /// Key for frames the peer sends.
    pub fn incoming_frame_key(&self) -> SecretKey {
        derive_frame_key(&self.secret, self.role().peer(), self.stream_number)
    }

    /// Tag this end writes before its first frame.
    pub fn outgoing_tag(&self) -> [u8; TAG_LENGTH] {
        encode_tag(&derive_tag_key(&self.secret, self.role()), self.stream_number)
    }

    /// Tag the peer is expected to write before its first frame.
    pub fn incoming_tag(&self) -> [u8; TAG_LENGTH] {
        encode_tag(
            &derive_tag_key(&self.secret, self.role().peer()),
            self.stream_number,
        )
    }

    /// The same connection seen from the other end.
    pub fn for_peer(&self) -> Self {
        Self {
            initiator: !self.initiator,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(initiator: bool, stream_number: u64) -> ConnectionContext {
        ConnectionContext::new(
            ContactId(1),
            TransportId::new("test").unwrap(),
            SecretKey::from_bytes([7u8; KEY_LENGTH]),
            stream_number,
            initiator,
        )
    }

    #[test]
    fn directions_use_different_keys() {
        let ctx = context(true, 0);
        assert_ne!(ctx.outgoing_frame_key(), ctx.incoming_frame_key());
        assert_ne!(ctx.outgoing_tag(), ctx.incoming_tag());
    }

    #[test]
    fn peers_agree_on_keys() {
        let alice = context(true, 3);
        let bob = alice.for_peer();
        assert_eq!(alice.outgoing_frame_key(), bob.incoming_frame_key());
        assert_eq!(alice.incoming_frame_key(), bob.outgoing_frame_key());
        assert_eq!(alice.outgoing_tag(), bob.incoming_tag());
    }

    #[test]
    fn stream_number_changes_frame_key_and_tag() {
        let first = context(true, 0);
        let second = context(true, 1);
        assert_ne!(first.outgoing_frame_key(), second.outgoing_frame_key());
        assert_ne!(first.outgoing_tag(), second.outgoing_tag());
    }

    #[test]
    fn derivation_is_deterministic() {
        let secret = SecretKey::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(
            derive_frame_key(&secret, Role::Responder, 5),
            derive_frame_key(&secret, Role::Responder, 5)
        );
        let tag_key = derive_tag_key(&secret, Role::Initiator);
        assert_eq!(encode_tag(&tag_key, 5), encode_tag(&tag_key, 5));
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let key = SecretKey::from_bytes([0xAB; KEY_LENGTH]);
        assert_eq!(format!("{key:?}"), "SecretKey(..)");
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(SecretKey::from_slice(&[0u8; 31]).is_none());
        assert!(SecretKey::from_slice(&[0u8; 32]).is_some());
    }
}
