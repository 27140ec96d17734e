//! Version 1 frame layout constants.

/// Maximum length of an encrypted frame on the wire, including the MAC.
pub const MAX_FRAME_LENGTH: usize = 1024;

/// Length of the Poly1305 authentication tag appended to every frame.
pub const MAC_LENGTH: usize = 16;

/// Length of the plaintext frame header: flags (1) + payload length (2).
pub const HEADER_LENGTH: usize = 3;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_FRAME_LENGTH - HEADER_LENGTH - MAC_LENGTH;

/// Length of the per-frame nonce.
pub const IV_LENGTH: usize = 12;

/// Length of the per-frame associated data: frame number (8) + plaintext length (2).
pub const AAD_LENGTH: usize = 10;

/// Length of the stream tag that precedes frame 0.
pub const TAG_LENGTH: usize = 16;

/// Length of secret and derived keys.
pub const KEY_LENGTH: usize = 32;

/// Header flag marking the last frame of a stream.
pub const FLAG_FINAL: u8 = 0x01;
