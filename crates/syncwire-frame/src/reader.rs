use std::io::{self, Read};

use syncwire_transport::{DuplexTransportConnection, InputStream};
use tracing::debug;

use crate::constants::{MAX_PAYLOAD_LENGTH, TAG_LENGTH};
use crate::decrypter::StreamDecrypter;
use crate::error::{transport_to_frame_error, FrameError, Result};
use crate::keys::ConnectionContext;
use crate::tag::read_tag;

/// Presents the payloads of an incoming frame stream as one byte stream.
///
/// Frame boundaries are invisible to the caller, so a packet may straddle
/// two frames. Frame errors surface from [`Read::read`] as
/// [`io::ErrorKind::InvalidData`]; use [`FrameError::from_io`] to recover
/// them.
pub struct ConnectionReader<R> {
    decrypter: StreamDecrypter<R>,
    expected_tag: Option<[u8; TAG_LENGTH]>,
    bad_tag: bool,
    payload: [u8; MAX_PAYLOAD_LENGTH],
    pos: usize,
    len: usize,
}

impl<R: Read> ConnectionReader<R> {
    /// Reader for the peer's stream, starting with its tag.
    pub fn new(inner: R, ctx: &ConnectionContext) -> Self {
        let mut reader = Self::after_tag(inner, ctx);
        reader.expected_tag = Some(ctx.incoming_tag());
        reader
    }

    /// Reader for the peer's stream whose tag has already been read, for
    /// example by a [`TagRecogniser`](crate::TagRecogniser).
    pub fn after_tag(inner: R, ctx: &ConnectionContext) -> Self {
        Self {
            decrypter: StreamDecrypter::from_context(inner, ctx),
            expected_tag: None,
            bad_tag: false,
            payload: [0u8; MAX_PAYLOAD_LENGTH],
            pos: 0,
            len: 0,
        }
    }

    /// Load the next frame's payload. Returns `false` at end-of-stream.
    fn fill(&mut self) -> Result<bool> {
        if self.bad_tag {
            return Err(FrameError::Format);
        }
        if let Some(expected) = self.expected_tag.take() {
            match read_tag(self.decrypter.get_mut()) {
                Ok(None) => return Ok(false),
                Ok(Some(tag)) if tag == expected => {}
                Ok(Some(_)) => {
                    debug!("stream tag mismatch");
                    self.bad_tag = true;
                    return Err(FrameError::Format);
                }
                Err(err) => {
                    self.bad_tag = true;
                    return Err(err);
                }
            }
        }
        match self.decrypter.read_frame(&mut self.payload)? {
            Some(len) => {
                self.pos = 0;
                self.len = len;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether the final frame has been consumed.
    pub fn is_finished(&self) -> bool {
        self.decrypter.is_finished()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        self.decrypter.get_ref()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.decrypter.into_inner()
    }
}

impl ConnectionReader<InputStream> {
    /// Reader over the input stream of a duplex connection.
    pub fn from_connection(
        connection: &dyn DuplexTransportConnection,
        ctx: &ConnectionContext,
    ) -> Result<Self> {
        let input = connection
            .input_stream()
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(input, ctx))
    }
}

impl<R: Read> Read for ConnectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos == self.len {
            if !self.fill()? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.len - self.pos);
        buf[..n].copy_from_slice(&self.payload[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use syncwire_transport::{ContactId, TransportId};

    use super::*;
    use crate::constants::{KEY_LENGTH, MAX_FRAME_LENGTH};
    use crate::encrypter::StreamEncrypter;
    use crate::keys::SecretKey;

    fn alice() -> ConnectionContext {
        ConnectionContext::new(
            ContactId(1),
            TransportId::new("test").unwrap(),
            SecretKey::from_bytes([5u8; KEY_LENGTH]),
            0,
            true,
        )
    }

    fn encrypt(ctx: &ConnectionContext, frames: &[(&[u8], bool)]) -> Vec<u8> {
        let mut enc = StreamEncrypter::from_context(Vec::new(), ctx);
        for (payload, final_frame) in frames {
            enc.write_frame(payload, *final_frame).unwrap();
        }
        enc.into_inner()
    }

    #[test]
    fn joins_payloads_across_frames() {
        let wire = encrypt(&alice(), &[(b"hel", false), (b"", false), (b"lo", true)]);
        let mut reader = ConnectionReader::new(Cursor::new(wire), &alice().for_peer());
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
        assert!(reader.is_finished());
    }

    #[test]
    fn wrong_tag_is_a_format_error() {
        let wire = encrypt(&alice(), &[(b"x", true)]);
        // Alice's reader expects Bob's tag, not her own.
        let mut reader = ConnectionReader::new(Cursor::new(wire), &alice());
        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(FrameError::from_io(err).is_format());

        // Retrying must not skip the tag check and decrypt the frames.
        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(reader.get_ref().position(), TAG_LENGTH as u64);
    }

    #[test]
    fn retry_after_a_bad_frame_keeps_failing() {
        let ctx = alice();
        let real = encrypt(&ctx, &[(b"real", true)]);
        let mut wire = real[..TAG_LENGTH].to_vec();
        wire.extend(vec![0xEE; MAX_FRAME_LENGTH]);
        wire.extend_from_slice(&real[TAG_LENGTH..]);

        let mut reader = ConnectionReader::new(Cursor::new(wire), &ctx.for_peer());
        let mut buf = [0u8; 8];
        for _ in 0..3 {
            let err = reader.read(&mut buf).unwrap_err();
            assert!(FrameError::from_io(err).is_format());
        }
        assert_eq!(
            reader.get_ref().position(),
            (TAG_LENGTH + MAX_FRAME_LENGTH) as u64
        );
    }

    #[test]
    fn empty_stream_reads_as_eof() {
        let mut reader = ConnectionReader::new(Cursor::new(Vec::new()), &alice().for_peer());
        assert_eq!(reader.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn after_tag_skips_tag_check() {
        let wire = encrypt(&alice(), &[(b"data", true)]);
        let mut cursor = Cursor::new(wire);
        let tag = read_tag(&mut cursor).unwrap().unwrap();
        assert_eq!(tag, alice().outgoing_tag());

        let mut reader = ConnectionReader::after_tag(cursor, &alice().for_peer());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"data");
    }

    #[test]
    fn small_reads_drain_a_frame() {
        let wire = encrypt(&alice(), &[(b"abcdef", true)]);
        let mut reader = ConnectionReader::new(Cursor::new(wire), &alice().for_peer());
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut wire = encrypt(&alice(), &[(b"one", false), (b"two", true)]);
        wire.truncate(TAG_LENGTH + MAX_FRAME_LENGTH + 10);
        let mut reader = ConnectionReader::new(Cursor::new(wire), &alice().for_peer());
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(FrameError::from_io(err).is_format());
        assert_eq!(out, b"one");
    }
}
