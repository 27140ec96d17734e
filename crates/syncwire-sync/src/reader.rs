use std::io::{self, Read};

use tracing::{debug, trace};

use crate::codec::decode_body;
use crate::error::{Result, SyncError};
use crate::packet::{
    Ack, Offer, Packet, PacketKind, Request, SubscriptionUpdate, TransportUpdate,
    UnverifiedMessage, MAX_PACKET_LENGTH, PACKET_HEADER_LENGTH,
};

/// Configuration for a [`PacketReader`].
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Largest body the reader will accept. Values above
    /// [`MAX_PACKET_LENGTH`] are clamped to it.
    pub max_packet_length: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_packet_length: MAX_PACKET_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    kind: PacketKind,
    body_len: usize,
}

/// Reads sync packets from a payload stream.
///
/// Packets can be consumed either by kind, peeking with `has_x()` and then
/// calling `read_x()`, or one at a time with [`read_packet`](Self::read_packet).
/// Both styles consume exactly the same bytes and may be mixed.
pub struct PacketReader<R> {
    inner: R,
    max_packet_length: usize,
    next: Option<Header>,
    eof: bool,
    body: Vec<u8>,
}

impl<R: Read> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, ReaderConfig::default())
    }

    pub fn with_config(inner: R, config: ReaderConfig) -> Self {
        Self {
            inner,
            max_packet_length: config.max_packet_length.min(MAX_PACKET_LENGTH),
            next: None,
            eof: false,
            body: Vec::new(),
        }
    }

    /// Whether the stream ended cleanly at a packet boundary.
    pub fn eof(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Kind of the next packet, or `None` at end of stream.
    pub fn peek_kind(&mut self) -> Result<Option<PacketKind>> {
        Ok(self.peek()?.map(|h| h.kind))
    }

    pub fn has_ack(&mut self) -> Result<bool> {
        self.has(PacketKind::Ack)
    }

    pub fn read_ack(&mut self) -> Result<Ack> {
        match self.read_expected(PacketKind::Ack)? {
            Packet::Ack(ack) => Ok(ack),
            other => Err(unexpected(PacketKind::Ack, &other)),
        }
    }

    pub fn has_message(&mut self) -> Result<bool> {
        self.has(PacketKind::Message)
    }

    pub fn read_message(&mut self) -> Result<UnverifiedMessage> {
        match self.read_expected(PacketKind::Message)? {
            Packet::Message(message) => Ok(message),
            other => Err(unexpected(PacketKind::Message, &other)),
        }
    }

    pub fn has_offer(&mut self) -> Result<bool> {
        self.has(PacketKind::Offer)
    }

    pub fn read_offer(&mut self) -> Result<Offer> {
        match self.read_expected(PacketKind::Offer)? {
            Packet::Offer(offer) => Ok(offer),
            other => Err(unexpected(PacketKind::Offer, &other)),
        }
    }

    pub fn has_request(&mut self) -> Result<bool> {
        self.has(PacketKind::Request)
    }

    pub fn read_request(&mut self) -> Result<Request> {
        match self.read_expected(PacketKind::Request)? {
            Packet::Request(request) => Ok(request),
            other => Err(unexpected(PacketKind::Request, &other)),
        }
    }

    pub fn has_subscription_update(&mut self) -> Result<bool> {
        self.has(PacketKind::SubscriptionUpdate)
    }

    pub fn read_subscription_update(&mut self) -> Result<SubscriptionUpdate> {
        match self.read_expected(PacketKind::SubscriptionUpdate)? {
            Packet::SubscriptionUpdate(update) => Ok(update),
            other => Err(unexpected(PacketKind::SubscriptionUpdate, &other)),
        }
    }

    pub fn has_transport_update(&mut self) -> Result<bool> {
        self.has(PacketKind::TransportUpdate)
    }

    pub fn read_transport_update(&mut self) -> Result<TransportUpdate> {
        match self.read_expected(PacketKind::TransportUpdate)? {
            Packet::TransportUpdate(update) => Ok(update),
            other => Err(unexpected(PacketKind::TransportUpdate, &other)),
        }
    }

    /// Read the next packet of any kind, or `None` at end of stream.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        match self.peek()? {
            Some(header) => self.read_body(header).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn has(&mut self, kind: PacketKind) -> Result<bool> {
        Ok(self.peek()?.is_some_and(|h| h.kind == kind))
    }

    fn read_expected(&mut self, expected: PacketKind) -> Result<Packet> {
        let header = self
            .peek()?
            .ok_or_else(|| SyncError::format(format!("end of stream, expected {expected}")))?;
        if header.kind != expected {
            return Err(SyncError::UnexpectedPacket {
                expected,
                found: header.kind,
            });
        }
        self.read_body(header)
    }

    fn peek(&mut self) -> Result<Option<Header>> {
        if let Some(header) = self.next {
            return Ok(Some(header));
        }
        if self.eof {
            return Ok(None);
        }

        let mut raw = [0u8; PACKET_HEADER_LENGTH];
        let n = read_fully(&mut self.inner, &mut raw)?;
        if n == 0 {
            self.eof = true;
            return Ok(None);
        }
        if n < PACKET_HEADER_LENGTH {
            return Err(SyncError::format("truncated packet header"));
        }

        let kind = PacketKind::from_u8(raw[0])
            .ok_or_else(|| SyncError::format(format!("unknown packet kind {}", raw[0])))?;
        let body_len = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]) as usize;
        if body_len > self.max_packet_length {
            debug!(%kind, body_len, max = self.max_packet_length, "oversized packet");
            return Err(SyncError::format(format!(
                "{kind} body is {body_len} bytes, max {}",
                self.max_packet_length
            )));
        }

        let header = Header { kind, body_len };
        self.next = Some(header);
        Ok(Some(header))
    }

    fn read_body(&mut self, header: Header) -> Result<Packet> {
        self.next = None;
        self.body.resize(header.body_len, 0);
        let n = read_fully(&mut self.inner, &mut self.body)?;
        if n < header.body_len {
            return Err(SyncError::format(format!(
                "truncated {}: {n} of {} bytes",
                header.kind, header.body_len
            )));
        }
        let packet = decode_body(header.kind, &self.body)?;
        trace!(kind = %header.kind, body_len = header.body_len, "packet read");
        Ok(packet)
    }
}

fn unexpected(expected: PacketKind, found: &Packet) -> SyncError {
    SyncError::UnexpectedPacket {
        expected,
        found: found.kind(),
    }
}

/// Read until `buf` is full or the stream ends, returning the bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::bitmap::Bitmap;
    use crate::packet::{MessageId, UNIQUE_ID_LENGTH};
    use crate::writer::PacketWriter;

    fn id(byte: u8) -> MessageId {
        MessageId::new([byte; UNIQUE_ID_LENGTH])
    }

    fn written(f: impl FnOnce(&mut PacketWriter<Vec<u8>>)) -> Vec<u8> {
        let mut writer = PacketWriter::new(Vec::new());
        f(&mut writer);
        writer.into_inner()
    }

    /// Yields one byte per read, with an interruption before each.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "again"));
            }
            if self.pos == self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn empty_stream_is_eof() {
        let mut reader = PacketReader::new(Cursor::new(Vec::new()));
        assert!(reader.eof().unwrap());
        assert!(!reader.has_ack().unwrap());
        assert!(reader.read_packet().unwrap().is_none());
        assert!(reader.read_ack().unwrap_err().is_format());
    }

    #[test]
    fn has_then_read_by_kind() {
        let wire = written(|w| {
            w.write_ack(&Ack::new(vec![id(1), id(2)]).unwrap()).unwrap();
            w.write_offer(&Offer::new(vec![id(3)]).unwrap()).unwrap();
        });
        let mut reader = PacketReader::new(Cursor::new(wire));
        assert!(reader.has_ack().unwrap());
        assert!(!reader.has_offer().unwrap());
        assert_eq!(reader.read_ack().unwrap().message_ids(), &[id(1), id(2)]);
        assert!(reader.has_offer().unwrap());
        assert_eq!(reader.read_offer().unwrap().message_ids(), &[id(3)]);
        assert!(reader.eof().unwrap());
    }

    #[test]
    fn wrong_kind_is_reported_without_consuming() {
        let wire = written(|w| {
            w.write_offer(&Offer::new(vec![id(3)]).unwrap()).unwrap();
        });
        let mut reader = PacketReader::new(Cursor::new(wire));
        let err = reader.read_request().unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnexpectedPacket {
                expected: PacketKind::Request,
                found: PacketKind::Offer
            }
        ));
        assert!(reader.read_offer().is_ok());
    }

    #[test]
    fn mixed_styles_consume_the_same_bytes() {
        let mut bitmap = Bitmap::new(3);
        bitmap.set(2);
        let request = Request::new(bitmap).unwrap();
        let message = UnverifiedMessage::new(vec![1u8, 2, 3]).unwrap();
        let wire = written(|w| {
            w.write_request(&request).unwrap();
            w.write_message(&message).unwrap();
        });
        let mut reader = PacketReader::new(Cursor::new(wire));
        assert_eq!(reader.read_packet().unwrap(), Some(Packet::Request(request)));
        assert_eq!(reader.read_message().unwrap(), message);
        assert_eq!(reader.read_packet().unwrap(), None);
    }

    #[test]
    fn unknown_kind_is_a_format_error() {
        let mut reader = PacketReader::new(Cursor::new(vec![9u8, 0, 0, 0, 0]));
        assert!(reader.read_packet().unwrap_err().is_format());
    }

    #[test]
    fn partial_header_is_a_format_error() {
        let mut reader = PacketReader::new(Cursor::new(vec![0u8, 0, 0]));
        assert!(reader.eof().unwrap_err().is_format());
    }

    #[test]
    fn truncated_body_is_a_format_error() {
        let mut wire = written(|w| {
            w.write_ack(&Ack::new(vec![id(1)]).unwrap()).unwrap();
        });
        wire.pop();
        let mut reader = PacketReader::new(Cursor::new(wire));
        assert!(reader.read_ack().unwrap_err().is_format());
    }

    #[test]
    fn oversized_declaration_is_refused_before_buffering() {
        let config = ReaderConfig {
            max_packet_length: 16,
        };
        let wire = written(|w| {
            w.write_message(&UnverifiedMessage::new(vec![0u8; 17]).unwrap())
                .unwrap();
        });
        let mut reader = PacketReader::with_config(Cursor::new(wire), config);
        assert!(reader.has_message().unwrap_err().is_format());
        assert_eq!(reader.get_ref().position(), PACKET_HEADER_LENGTH as u64);
    }

    #[test]
    fn trickled_input_is_reassembled() {
        let update = TransportUpdate::new(Vec::new(), 42).unwrap();
        let data = written(|w| w.write_transport_update(&update).unwrap());
        let mut reader = PacketReader::new(Trickle {
            data,
            pos: 0,
            interrupt: false,
        });
        assert_eq!(reader.read_transport_update().unwrap(), update);
        assert!(reader.eof().unwrap());
    }

    #[test]
    fn io_errors_propagate() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let mut reader = PacketReader::new(Failing);
        assert!(matches!(reader.read_packet(), Err(SyncError::Io(_))));
    }
}
