use std::io::{ErrorKind, Read};

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce, Tag};
use tracing::debug;

use crate::codec::{decode_header, encode_aad, encode_iv};
use crate::constants::{HEADER_LENGTH, MAC_LENGTH, MAX_FRAME_LENGTH};
use crate::error::{FrameError, Result};
use crate::keys::{ConnectionContext, SecretKey};

/// Decrypts and validates frames produced by a
/// [`StreamEncrypter`](crate::StreamEncrypter).
///
/// Once a final frame has been read, the decrypter never touches the
/// underlying stream again. After a frame is rejected every later read fails
/// with [`FrameError::Format`] without reading.
pub struct StreamDecrypter<R> {
    inner: R,
    cipher: ChaCha20Poly1305,
    frame_number: u64,
    finished: bool,
    failed: bool,
    frame: [u8; MAX_FRAME_LENGTH],
}

impl<R: Read> StreamDecrypter<R> {
    pub fn new(inner: R, frame_key: &SecretKey) -> Self {
        Self {
            inner,
            cipher: ChaCha20Poly1305::new(frame_key.as_bytes().into()),
            frame_number: 0,
            finished: false,
            failed: false,
            frame: [0u8; MAX_FRAME_LENGTH],
        }
    }

    /// Create the decrypter for the peer's stream. The stream tag must already
    /// have been consumed.
    pub fn from_context(inner: R, ctx: &ConnectionContext) -> Self {
        Self::new(inner, &ctx.incoming_frame_key())
    }

    /// Read the next frame, copying its payload into `payload`.
    ///
    /// Returns `Ok(None)` at end-of-stream: after the final frame, or if the
    /// stream ends cleanly before frame 0. Any malformed, truncated or
    /// tampered frame yields [`FrameError::Format`], and so does every call
    /// after it.
    pub fn read_frame(&mut self, payload: &mut [u8]) -> Result<Option<usize>> {
        if self.failed {
            return Err(FrameError::Format);
        }
        if self.finished {
            return Ok(None);
        }

        let frame_length = self.fill_frame()?;
        if frame_length == 0 && self.frame_number == 0 {
            debug!("stream ended before the first frame");
            self.finished = true;
            return Ok(None);
        }
        if frame_length < HEADER_LENGTH + MAC_LENGTH {
            return Err(self.reject("truncated frame"));
        }

        let plaintext_length = frame_length - MAC_LENGTH;
        let iv = encode_iv(self.frame_number);
        let aad = encode_aad(self.frame_number, plaintext_length);
        let (plaintext, mac) = self.frame[..frame_length].split_at_mut(plaintext_length);
        let mac = *Tag::from_slice(mac);
        if self
            .cipher
            .decrypt_in_place_detached(Nonce::from_slice(&iv), &aad, plaintext, &mac)
            .is_err()
        {
            return Err(self.reject("authentication failed"));
        }

        let header = match decode_header(&self.frame[..plaintext_length]) {
            Ok(header) => header,
            Err(_) => return Err(self.reject("reserved header bits set")),
        };
        if !header.final_frame && frame_length < MAX_FRAME_LENGTH {
            return Err(self.reject("short non-final frame"));
        }
        if header.payload_length > plaintext_length - HEADER_LENGTH {
            return Err(self.reject("payload length exceeds frame"));
        }
        let payload_end = HEADER_LENGTH + header.payload_length;
        if self.frame[payload_end..plaintext_length]
            .iter()
            .any(|&b| b != 0)
        {
            return Err(self.reject("non-zero padding"));
        }
        if payload.len() < header.payload_length {
            // The frame is already off the wire.
            self.failed = true;
            return Err(FrameError::PayloadTooLarge {
                size: header.payload_length,
                max: payload.len(),
            });
        }

        self.frame_number += 1;
        self.finished = header.final_frame;
        payload[..header.payload_length].copy_from_slice(&self.frame[HEADER_LENGTH..payload_end]);
        if self.finished {
            debug!(frames = self.frame_number, "final frame read");
        }
        Ok(Some(header.payload_length))
    }

    /// Read until a whole frame is buffered or the stream ends.
    fn fill_frame(&mut self) -> Result<usize> {
        let mut filled = 0;
        while filled < MAX_FRAME_LENGTH {
            match self.inner.read(&mut self.frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(filled)
    }

    fn reject(&mut self, reason: &'static str) -> FrameError {
        debug!(frame = self.frame_number, reason, "rejecting frame");
        self.failed = true;
        FrameError::Format
    }

    /// Number of the next frame expected.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Whether a frame has been rejected.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Whether end-of-stream has been reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the decrypter and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
