//! Authenticated, encrypted frames over a byte stream.
//!
//! Each direction of a connection is a stream of fixed-size frames:
//! - a 16-byte tag identifying the stream
//! - frames of exactly [`MAX_FRAME_LENGTH`] bytes, each a ChaCha20-Poly1305
//!   sealed header, payload and zero padding
//! - a final frame marking the end of the stream
//!
//! Frame numbers and plaintext lengths are bound into every frame's
//! associated data, so reordered, replayed, truncated or resized frames fail
//! authentication. All such failures are reported as one opaque
//! [`FrameError::Format`].

pub mod codec;
pub mod constants;
pub mod decrypter;
pub mod encrypter;
pub mod error;
pub mod keys;
pub mod reader;
pub mod tag;
pub mod writer;

pub use codec::{decode_header, encode_aad, encode_header, encode_iv, FrameHeader};
pub use constants::{
    AAD_LENGTH, HEADER_LENGTH, IV_LENGTH, KEY_LENGTH, MAC_LENGTH, MAX_FRAME_LENGTH,
    MAX_PAYLOAD_LENGTH, TAG_LENGTH,
};
pub use decrypter::StreamDecrypter;
pub use encrypter::StreamEncrypter;
pub use error::{FrameError, Result};
pub use keys::{derive_frame_key, derive_tag_key, encode_tag, ConnectionContext, Role, SecretKey};
pub use reader::ConnectionReader;
pub use tag::{read_tag, TagRecogniser};
pub use writer::ConnectionWriter;
