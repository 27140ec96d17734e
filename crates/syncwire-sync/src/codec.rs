//! Packet body encoding.
//!
//! Bodies are encoded into a [`BytesMut`] and decoded from a complete body
//! slice. Decoding is strict: every length is checked against both the
//! remaining input and the packet limits, and the body must be consumed
//! exactly.

use std::collections::{BTreeMap, BTreeSet};

use bytes::{Buf, BufMut, BytesMut};
use syncwire_transport::ids::MAX_TRANSPORT_ID_LENGTH;
use syncwire_transport::TransportId;

use crate::bitmap::Bitmap;
use crate::error::{Result, SyncError};
use crate::packet::{
    Ack, Group, GroupId, MessageId, Offer, Packet, PacketKind, Request, SubscriptionUpdate,
    Transport, TransportUpdate, UnverifiedMessage, MAX_GROUP_NAME_LENGTH, MAX_IDS_PER_PACKET,
    MAX_PROPERTIES_PER_TRANSPORT, MAX_PROPERTY_LENGTH, MAX_PUBLIC_KEY_LENGTH, MAX_SUBSCRIPTIONS,
    MAX_TRANSPORTS, UNIQUE_ID_LENGTH,
};

/// Append the body of `packet` to `dst`.
pub fn encode_body(packet: &Packet, dst: &mut BytesMut) {
    match packet {
        Packet::Ack(ack) => encode_ack(ack, dst),
        Packet::Message(message) => encode_message(message, dst),
        Packet::Offer(offer) => encode_offer(offer, dst),
        Packet::Request(request) => encode_request(request, dst),
        Packet::SubscriptionUpdate(update) => encode_subscription_update(update, dst),
        Packet::TransportUpdate(update) => encode_transport_update(update, dst),
    }
}

pub(crate) fn encode_ack(ack: &Ack, dst: &mut BytesMut) {
    put_ids(ack.message_ids(), dst);
}

pub(crate) fn encode_message(message: &UnverifiedMessage, dst: &mut BytesMut) {
    dst.put_slice(message.as_bytes());
}

pub(crate) fn encode_offer(offer: &Offer, dst: &mut BytesMut) {
    put_ids(offer.message_ids(), dst);
}

pub(crate) fn encode_request(request: &Request, dst: &mut BytesMut) {
    let bitmap = request.bitmap();
    dst.put_u32(bitmap.len() as u32);
    dst.put_slice(bitmap.as_bytes());
}

pub(crate) fn encode_subscription_update(update: &SubscriptionUpdate, dst: &mut BytesMut) {
    dst.put_u16(update.removed().len() as u16);
    for id in update.removed() {
        dst.put_slice(id.as_bytes());
    }
    dst.put_u16(update.subscriptions().len() as u16);
    for (group, version) in update.subscriptions() {
        put_group(group, dst);
        dst.put_u64(*version);
    }
    dst.put_u64(update.version());
    dst.put_u64(update.timestamp());
}

pub(crate) fn encode_transport_update(update: &TransportUpdate, dst: &mut BytesMut) {
    dst.put_u16(update.transports().len() as u16);
    for transport in update.transports() {
        put_string(transport.id().as_str(), dst);
        dst.put_u16(transport.properties().len() as u16);
        for (key, value) in transport.properties() {
            put_string(key, dst);
            put_string(value, dst);
        }
    }
    dst.put_u64(update.timestamp());
}

fn put_ids(ids: &[MessageId], dst: &mut BytesMut) {
    dst.put_u16(ids.len() as u16);
    for id in ids {
        dst.put_slice(id.as_bytes());
    }
}

fn put_group(group: &Group, dst: &mut BytesMut) {
    dst.put_slice(group.id().as_bytes());
    put_string(group.name(), dst);
    match group.public_key() {
        Some(key) => {
            dst.put_u8(1);
            dst.put_u16(key.len() as u16);
            dst.put_slice(key);
        }
        None => dst.put_u8(0),
    }
}

fn put_string(value: &str, dst: &mut BytesMut) {
    dst.put_u16(value.len() as u16);
    dst.put_slice(value.as_bytes());
}

/// Decode a complete body of the given kind.
pub fn decode_body(kind: PacketKind, body: &[u8]) -> Result<Packet> {
    let mut decoder = Decoder { buf: body };
    let packet = match kind {
        PacketKind::Ack => Packet::Ack(Ack::new(decoder.ids()?)?),
        PacketKind::Message => {
            let raw = decoder.take(decoder.buf.len())?;
            Packet::Message(UnverifiedMessage::new(raw.to_vec())?)
        }
        PacketKind::Offer => Packet::Offer(Offer::new(decoder.ids()?)?),
        PacketKind::Request => {
            let len = decoder.u32()? as usize;
            if len == 0 || len > MAX_IDS_PER_PACKET {
                return Err(SyncError::format(format!("request length {len}")));
            }
            let bytes = decoder.take(len.div_ceil(8))?.to_vec();
            let bitmap = Bitmap::from_bytes(bytes, len)
                .ok_or_else(|| SyncError::format("request bitmap has padding bits set"))?;
            Packet::Request(Request::new(bitmap)?)
        }
        PacketKind::SubscriptionUpdate => {
            let removed_count = decoder.count(MAX_SUBSCRIPTIONS, "removed groups")?;
            let mut removed = BTreeSet::new();
            for _ in 0..removed_count {
                if !removed.insert(GroupId::new(decoder.unique_id()?)) {
                    return Err(SyncError::format("removed group listed twice"));
                }
            }
            let count = decoder.count(MAX_SUBSCRIPTIONS, "groups")?;
            let mut subscriptions = BTreeMap::new();
            for _ in 0..count {
                let group = decoder.group()?;
                let version = decoder.u64()?;
                subscriptions.insert(group, version);
            }
            if subscriptions.len() != count {
                return Err(SyncError::format("group listed twice"));
            }
            let version = decoder.u64()?;
            let timestamp = decoder.u64()?;
            Packet::SubscriptionUpdate(SubscriptionUpdate::new(
                removed,
                subscriptions,
                version,
                timestamp,
            )?)
        }
        PacketKind::TransportUpdate => {
            let count = decoder.count(MAX_TRANSPORTS, "transports")?;
            let mut transports = Vec::with_capacity(count);
            for _ in 0..count {
                transports.push(decoder.transport()?);
            }
            let timestamp = decoder.u64()?;
            Packet::TransportUpdate(TransportUpdate::new(transports, timestamp)?)
        }
    };
    if decoder.buf.has_remaining() {
        return Err(SyncError::format(format!(
            "{} trailing bytes after {kind}",
            decoder.buf.remaining()
        )));
    }
    Ok(packet)
}

struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(SyncError::format(format!(
                "truncated body: need {n} bytes, have {}",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn count(&mut self, max: usize, what: &str) -> Result<usize> {
        let count = self.u16()? as usize;
        if count > max {
            return Err(SyncError::format(format!("{count} {what}, max {max}")));
        }
        Ok(count)
    }

    fn unique_id(&mut self) -> Result<[u8; UNIQUE_ID_LENGTH]> {
        let mut id = [0u8; UNIQUE_ID_LENGTH];
        id.copy_from_slice(self.take(UNIQUE_ID_LENGTH)?);
        Ok(id)
    }

    fn ids(&mut self) -> Result<Vec<MessageId>> {
        let count = self.count(MAX_IDS_PER_PACKET, "ids")?;
        (0..count)
            .map(|_| self.unique_id().map(MessageId::new))
            .collect()
    }

    fn bytes(&mut self, max: usize) -> Result<&'a [u8]> {
        let len = self.u16()? as usize;
        if len > max {
            return Err(SyncError::format(format!("field is {len} bytes, max {max}")));
        }
        self.take(len)
    }

    fn string(&mut self, max: usize) -> Result<String> {
        let raw = self.bytes(max)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| SyncError::format("string is not valid UTF-8"))
    }

    fn group(&mut self) -> Result<Group> {
        let id = GroupId::new(self.unique_id()?);
        let name = self.string(MAX_GROUP_NAME_LENGTH)?;
        let public_key = match self.u8()? {
            0 => None,
            1 => Some(self.bytes(MAX_PUBLIC_KEY_LENGTH)?.to_vec()),
            flag => return Err(SyncError::format(format!("public key flag {flag}"))),
        };
        Group::new(id, name, public_key)
    }

    fn transport(&mut self) -> Result<Transport> {
        let id = TransportId::new(self.string(MAX_TRANSPORT_ID_LENGTH)?)
            .map_err(|e| SyncError::format(e.to_string()))?;
        let count = self.count(MAX_PROPERTIES_PER_TRANSPORT, "properties")?;
        let mut properties = BTreeMap::new();
        for _ in 0..count {
            let key = self.string(MAX_PROPERTY_LENGTH)?;
            let value = self.string(MAX_PROPERTY_LENGTH)?;
            if properties.insert(key, value).is_some() {
                return Err(SyncError::format(format!("transport {id} repeats a property")));
            }
        }
        Transport::new(id, properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(packet: &Packet) -> BytesMut {
        let mut dst = BytesMut::new();
        encode_body(packet, &mut dst);
        dst
    }

    fn id(byte: u8) -> MessageId {
        MessageId::new([byte; UNIQUE_ID_LENGTH])
    }

    #[test]
    fn ack_layout() {
        let packet = Packet::Ack(Ack::new(vec![id(1), id(2)]).unwrap());
        let encoded = body(&packet);
        assert_eq!(encoded.len(), 2 + 2 * UNIQUE_ID_LENGTH);
        assert_eq!(&encoded[..2], &[0, 2]);
        assert_eq!(decode_body(PacketKind::Ack, &encoded).unwrap(), packet);
    }

    #[test]
    fn request_layout_is_msb_first() {
        let mut bitmap = Bitmap::new(4);
        bitmap.set(1);
        bitmap.set(3);
        let packet = Packet::Request(Request::new(bitmap).unwrap());
        let encoded = body(&packet);
        assert_eq!(&encoded[..], &[0, 0, 0, 4, 0b0101_0000]);
        assert_eq!(decode_body(PacketKind::Request, &encoded).unwrap(), packet);
    }

    #[test]
    fn request_padding_bits_are_rejected() {
        let err = decode_body(PacketKind::Request, &[0, 0, 0, 4, 0b0101_0001]).unwrap_err();
        assert!(err.is_format());
        assert!(decode_body(PacketKind::Request, &[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = body(&Packet::Offer(Offer::new(vec![id(9)]).unwrap()));
        encoded.put_u8(0);
        assert!(decode_body(PacketKind::Offer, &encoded).unwrap_err().is_format());
    }

    #[test]
    fn truncated_bodies_are_rejected() {
        let encoded = body(&Packet::Ack(Ack::new(vec![id(1), id(2)]).unwrap()));
        for cut in 0..encoded.len() {
            assert!(decode_body(PacketKind::Ack, &encoded[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn subscription_update_decodes_groups() {
        let mut subs = BTreeMap::new();
        subs.insert(Group::new(GroupId::new([1; 32]), "open", None).unwrap(), 0);
        subs.insert(
            Group::new(GroupId::new([2; 32]), "restricted", Some(vec![7; 20])).unwrap(),
            3,
        );
        let removed = BTreeSet::from([GroupId::new([3; 32])]);
        let packet =
            Packet::SubscriptionUpdate(SubscriptionUpdate::new(removed, subs, 4, 1_000).unwrap());
        let encoded = body(&packet);
        assert_eq!(decode_body(PacketKind::SubscriptionUpdate, &encoded).unwrap(), packet);
    }

    #[test]
    fn duplicate_group_ids_are_rejected() {
        let mut dst = BytesMut::new();
        dst.put_u16(0);
        dst.put_u16(2);
        for name in ["a", "b"] {
            put_group(&Group::new(GroupId::new([5; 32]), name, None).unwrap(), &mut dst);
            dst.put_u64(0);
        }
        dst.put_u64(0);
        dst.put_u64(0);
        assert!(decode_body(PacketKind::SubscriptionUpdate, &dst).unwrap_err().is_format());
    }

    #[test]
    fn bad_public_key_flag_is_rejected() {
        let mut dst = BytesMut::new();
        dst.put_u16(0);
        dst.put_u16(1);
        dst.put_slice(&[1; 32]);
        put_string("g", &mut dst);
        dst.put_u8(2);
        dst.put_u64(0);
        dst.put_u64(0);
        dst.put_u64(0);
        assert!(decode_body(PacketKind::SubscriptionUpdate, &dst).is_err());
    }

    #[test]
    fn transport_update_rejects_bad_utf8_and_repeated_keys() {
        let mut dst = BytesMut::new();
        dst.put_u16(1);
        put_string("tcp", &mut dst);
        dst.put_u16(1);
        dst.put_u16(2);
        dst.put_slice(&[0xC3, 0x28]);
        put_string("v", &mut dst);
        dst.put_u64(0);
        assert!(decode_body(PacketKind::TransportUpdate, &dst).unwrap_err().is_format());

        let mut dst = BytesMut::new();
        dst.put_u16(1);
        put_string("tcp", &mut dst);
        dst.put_u16(2);
        for _ in 0..2 {
            put_string("address", &mut dst);
            put_string("127.0.0.1:1", &mut dst);
        }
        dst.put_u64(0);
        assert!(decode_body(PacketKind::TransportUpdate, &dst).unwrap_err().is_format());
    }

    #[test]
    fn empty_transport_id_is_rejected() {
        let mut dst = BytesMut::new();
        dst.put_u16(1);
        put_string("", &mut dst);
        dst.put_u16(0);
        dst.put_u64(0);
        assert!(decode_body(PacketKind::TransportUpdate, &dst).unwrap_err().is_format());
    }

    #[test]
    fn message_body_is_opaque() {
        let packet = Packet::Message(UnverifiedMessage::new(vec![0u8, 1, 2, 3]).unwrap());
        let encoded = body(&packet);
        assert_eq!(&encoded[..], &[0, 1, 2, 3]);
        assert_eq!(decode_body(PacketKind::Message, &encoded).unwrap(), packet);
        assert!(decode_body(PacketKind::Message, &[]).is_err());
    }
}
