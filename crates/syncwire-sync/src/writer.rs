use std::io::Write;

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::codec::{
    encode_ack, encode_body, encode_message, encode_offer, encode_request,
    encode_subscription_update, encode_transport_update,
};
use crate::error::{Result, SyncError};
use crate::packet::{
    Ack, Offer, Packet, PacketKind, Request, SubscriptionUpdate, TransportUpdate,
    UnverifiedMessage, MAX_PACKET_LENGTH, PACKET_HEADER_LENGTH,
};

/// Writes sync packets to a payload stream.
///
/// Each packet is written with a single `write_all`, so a packet is never
/// half-written because it was too large. Nothing is flushed until
/// [`flush`](Self::flush) is called.
pub struct PacketWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> PacketWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(PACKET_HEADER_LENGTH + 1024),
        }
    }

    pub fn write_ack(&mut self, ack: &Ack) -> Result<()> {
        self.write_with(PacketKind::Ack, |buf| encode_ack(ack, buf))
    }

    pub fn write_message(&mut self, message: &UnverifiedMessage) -> Result<()> {
        self.write_with(PacketKind::Message, |buf| encode_message(message, buf))
    }

    pub fn write_offer(&mut self, offer: &Offer) -> Result<()> {
        self.write_with(PacketKind::Offer, |buf| encode_offer(offer, buf))
    }

    pub fn write_request(&mut self, request: &Request) -> Result<()> {
        self.write_with(PacketKind::Request, |buf| encode_request(request, buf))
    }

    pub fn write_subscription_update(&mut self, update: &SubscriptionUpdate) -> Result<()> {
        self.write_with(PacketKind::SubscriptionUpdate, |buf| {
            encode_subscription_update(update, buf)
        })
    }

    pub fn write_transport_update(&mut self, update: &TransportUpdate) -> Result<()> {
        self.write_with(PacketKind::TransportUpdate, |buf| {
            encode_transport_update(update, buf)
        })
    }

    /// Encode and write any packet.
    ///
    /// Fails with [`SyncError::PacketTooLarge`] without writing anything if
    /// the encoded body exceeds [`MAX_PACKET_LENGTH`].
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.write_with(packet.kind(), |buf| encode_body(packet, buf))
    }

    fn write_with(&mut self, kind: PacketKind, encode: impl FnOnce(&mut BytesMut)) -> Result<()> {
        self.buf.clear();
        self.buf.put_u8(kind.as_u8());
        self.buf.put_u32(0);
        encode(&mut self.buf);

        let body_len = self.buf.len() - PACKET_HEADER_LENGTH;
        if body_len > MAX_PACKET_LENGTH {
            return Err(SyncError::PacketTooLarge {
                size: body_len,
                max: MAX_PACKET_LENGTH,
            });
        }
        self.buf[1..PACKET_HEADER_LENGTH].copy_from_slice(&(body_len as u32).to_be_bytes());

        self.inner.write_all(&self.buf)?;
        trace!(%kind, body_len, "packet written");
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
