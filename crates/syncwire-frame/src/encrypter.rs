use std::io::Write;

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use tracing::debug;

use crate::codec::{encode_aad, encode_header, encode_iv};
use crate::constants::{HEADER_LENGTH, MAC_LENGTH, MAX_FRAME_LENGTH, MAX_PAYLOAD_LENGTH, TAG_LENGTH};
use crate::error::{FrameError, Result};
use crate::keys::{ConnectionContext, SecretKey};

const PLAINTEXT_LENGTH: usize = MAX_FRAME_LENGTH - MAC_LENGTH;

/// Encrypts payloads into fixed-size authenticated frames.
///
/// Every frame, including the final one, occupies exactly
/// [`MAX_FRAME_LENGTH`] bytes on the wire. If the encrypter was given a stream
/// tag, the tag is written immediately before frame 0.
pub struct StreamEncrypter<W> {
    inner: W,
    cipher: ChaCha20Poly1305,
    tag: Option<[u8; TAG_LENGTH]>,
    frame_number: u64,
    final_written: bool,
    bytes_written: u64,
    frame: [u8; MAX_FRAME_LENGTH],
}

impl<W: Write> StreamEncrypter<W> {
    /// Create an encrypter that writes frames only, with no leading tag.
    pub fn new(inner: W, frame_key: &SecretKey) -> Self {
        Self {
            inner,
            cipher: ChaCha20Poly1305::new(frame_key.as_bytes().into()),
            tag: None,
            frame_number: 0,
            final_written: false,
            bytes_written: 0,
            frame: [0u8; MAX_FRAME_LENGTH],
        }
    }

    /// Create an encrypter that writes `tag` before the first frame.
    pub fn with_tag(inner: W, frame_key: &SecretKey, tag: [u8; TAG_LENGTH]) -> Self {
        let mut encrypter = Self::new(inner, frame_key);
        encrypter.tag = Some(tag);
        encrypter
    }

    /// Create the encrypter for this end's outgoing stream.
    pub fn from_context(inner: W, ctx: &ConnectionContext) -> Self {
        Self::with_tag(inner, &ctx.outgoing_frame_key(), ctx.outgoing_tag())
    }

    /// Encrypt and write one frame.
    ///
    /// After a final frame, every further call fails with
    /// [`FrameError::FinalFrameWritten`].
    pub fn write_frame(&mut self, payload: &[u8], final_frame: bool) -> Result<()> {
        if self.final_written {
            return Err(FrameError::FinalFrameWritten);
        }
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_LENGTH,
            });
        }
        let next_frame = self
            .frame_number
            .checked_add(1)
            .ok_or(FrameError::CounterExhausted)?;

        if let Some(tag) = self.tag.take() {
            self.inner.write_all(&tag)?;
            self.bytes_written += TAG_LENGTH as u64;
        }

        let header = encode_header(final_frame, payload.len())?;
        let plaintext = &mut self.frame[..PLAINTEXT_LENGTH];
        plaintext[..HEADER_LENGTH].copy_from_slice(&header);
        plaintext[HEADER_LENGTH..HEADER_LENGTH + payload.len()].copy_from_slice(payload);
        plaintext[HEADER_LENGTH + payload.len()..].fill(0);

        let iv = encode_iv(self.frame_number);
        let aad = encode_aad(self.frame_number, PLAINTEXT_LENGTH);
        let mac = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), &aad, plaintext)
            .map_err(|_| FrameError::Format)?;
        self.frame[PLAINTEXT_LENGTH..].copy_from_slice(&mac);
        // A frame number is spent once used, even if the write below fails.
        self.frame_number = next_frame;

        self.inner.write_all(&self.frame)?;
        self.bytes_written += MAX_FRAME_LENGTH as u64;

        if final_frame {
            self.final_written = true;
            self.inner.flush()?;
            debug!(frames = self.frame_number, "final frame written");
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Number of the next frame to be written.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Whether the final frame has been written.
    pub fn is_finished(&self) -> bool {
        self.final_written
    }

    /// Bytes written to the underlying stream so far, tag included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the stream tag is still to be written.
    pub fn tag_pending(&self) -> bool {
        self.tag.is_some()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the encrypter and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    #[cfg(test)]
    pub(crate) fn set_frame_number(&mut self, frame_number: u64) {
        self.frame_number = frame_number;
    }
}
