use std::io::{self, Write};

use bytes::{BufMut, BytesMut};
use syncwire_transport::{DuplexTransportConnection, OutputStream, SimplexTransportWriter};

use crate::constants::{MAX_FRAME_LENGTH, MAX_PAYLOAD_LENGTH, TAG_LENGTH};
use crate::encrypter::StreamEncrypter;
use crate::error::{transport_to_frame_error, FrameError, Result};
use crate::keys::ConnectionContext;

/// Turns a byte stream into this end's outgoing frame stream.
///
/// Bytes are buffered until a frame is full. [`flush`](Write::flush) sends
/// whatever is buffered as a non-final frame; [`finish`](Self::finish) sends
/// the final frame. Dropping the writer without calling `finish` leaves the
/// stream unterminated, which the peer treats as truncation.
pub struct ConnectionWriter<W> {
    encrypter: StreamEncrypter<W>,
    buf: BytesMut,
    capacity: Option<u64>,
}

impl<W: Write> ConnectionWriter<W> {
    pub fn new(inner: W, ctx: &ConnectionContext) -> Self {
        Self {
            encrypter: StreamEncrypter::from_context(inner, ctx),
            buf: BytesMut::with_capacity(MAX_PAYLOAD_LENGTH),
            capacity: None,
        }
    }

    /// Writer for a carrier that can accept at most `capacity` bytes.
    pub fn with_capacity(inner: W, ctx: &ConnectionContext, capacity: u64) -> Self {
        let mut writer = Self::new(inner, ctx);
        writer.capacity = Some(capacity);
        writer
    }

    /// Payload bytes that can still be written before the carrier's capacity
    /// is used up, keeping room for the final frame.
    ///
    /// Unbounded writers report `u64::MAX`.
    pub fn remaining_capacity(&self) -> u64 {
        let Some(capacity) = self.capacity else {
            return u64::MAX;
        };
        let pending_tag = if self.encrypter.tag_pending() {
            TAG_LENGTH as u64
        } else {
            0
        };
        let used = self.encrypter.bytes_written() + pending_tag;
        // A full buffer goes out as a non-final frame, so `finish` always
        // needs a frame of its own.
        let frames = (capacity.saturating_sub(used) / MAX_FRAME_LENGTH as u64).saturating_sub(1);
        (frames * MAX_PAYLOAD_LENGTH as u64).saturating_sub(self.buf.len() as u64)
    }

    /// Send buffered bytes in the final frame and flush.
    ///
    /// The stream accepts no more data afterwards.
    pub fn finish(&mut self) -> Result<()> {
        self.encrypter.write_frame(&self.buf, true)?;
        self.buf.clear();
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.encrypter.is_finished()
    }

    /// Bytes handed to the underlying stream so far, tag included.
    pub fn bytes_written(&self) -> u64 {
        self.encrypter.bytes_written()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        self.encrypter.get_ref()
    }

    /// Consume the writer and return the inner stream. Buffered bytes are
    /// discarded.
    pub fn into_inner(self) -> W {
        self.encrypter.into_inner()
    }

    fn write_full_frame(&mut self) -> Result<()> {
        self.encrypter.write_frame(&self.buf, false)?;
        self.buf.clear();
        Ok(())
    }
}

impl ConnectionWriter<OutputStream> {
    /// Writer over the output stream of a duplex connection.
    pub fn from_connection(
        connection: &dyn DuplexTransportConnection,
        ctx: &ConnectionContext,
    ) -> Result<Self> {
        let output = connection
            .output_stream()
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(output, ctx))
    }

    /// Writer bounded by a simplex carrier's capacity.
    pub fn from_simplex(
        writer: &mut dyn SimplexTransportWriter,
        ctx: &ConnectionContext,
    ) -> Result<Self> {
        let capacity = writer.capacity();
        let output = writer.output_stream().map_err(transport_to_frame_error)?;
        Ok(Self::with_capacity(output, ctx, capacity))
    }
}

impl<W: Write> Write for ConnectionWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.encrypter.is_finished() {
            return Err(FrameError::FinalFrameWritten.into());
        }
        if data.is_empty() {
            return Ok(0);
        }
        let n = data.len().min(MAX_PAYLOAD_LENGTH - self.buf.len());
        self.buf.put_slice(&data[..n]);
        if self.buf.len() == MAX_PAYLOAD_LENGTH {
            self.write_full_frame()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.write_full_frame()?;
        }
        self.encrypter.flush()?;
        Ok(())
    }
}
