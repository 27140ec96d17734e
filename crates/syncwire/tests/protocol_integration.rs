use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::thread;
use std::time::Duration;

use syncwire::frame::{
    read_tag, ConnectionContext, ConnectionReader, ConnectionWriter, SecretKey, TagRecogniser,
    KEY_LENGTH, MAX_FRAME_LENGTH, TAG_LENGTH,
};
use syncwire::sync::{
    Ack, Bitmap, Group, GroupId, MessageId, Offer, PacketReader, PacketWriter, Request,
    SubscriptionUpdate, Transport, TransportUpdate, UnverifiedMessage, UNIQUE_ID_LENGTH,
};
use syncwire::transport::{
    ContactId, DuplexTransportConnection, FilePlugin, SimplexPlugin, TransportId,
};

const TIMESTAMP: u64 = 1_700_000_000_000;

fn context() -> ConnectionContext {
    ConnectionContext::new(
        ContactId(1),
        TransportId::new("tcp").expect("valid transport id"),
        SecretKey::from_bytes([0x42; KEY_LENGTH]),
        7,
        true,
    )
}

fn messages() -> Vec<UnverifiedMessage> {
    (0..4u8)
        .map(|i| UnverifiedMessage::new(vec![i; 100 + usize::from(i) * 50]).unwrap())
        .collect()
}

fn message_ids(messages: &[UnverifiedMessage]) -> Vec<MessageId> {
    messages.iter().map(UnverifiedMessage::id).collect()
}

fn request() -> Request {
    let mut bitmap = Bitmap::new(4);
    bitmap.set(1);
    bitmap.set(3);
    Request::new(bitmap).unwrap()
}

fn subscription_update() -> SubscriptionUpdate {
    let open = Group::new(GroupId::new([0x11; UNIQUE_ID_LENGTH]), "Open group", None).unwrap();
    let restricted = Group::new(
        GroupId::new([0x22; UNIQUE_ID_LENGTH]),
        "Restricted group",
        Some(vec![0xAB; 91]),
    )
    .unwrap();
    let subscriptions = BTreeMap::from([(open, 0), (restricted, 0)]);
    SubscriptionUpdate::new(BTreeSet::new(), subscriptions, 0, TIMESTAMP).unwrap()
}

fn transport_update() -> TransportUpdate {
    let properties = BTreeMap::from([("bar".to_string(), "baz".to_string())]);
    let transport = Transport::new(TransportId::new("foo").unwrap(), properties).unwrap();
    TransportUpdate::new(vec![transport], TIMESTAMP).unwrap()
}

/// Write the standard exchange: an ack, four messages, an offer, a request,
/// a subscription update and a transport update.
fn write_exchange<W: Write>(packets: &mut PacketWriter<W>, messages: &[UnverifiedMessage]) {
    let ids = message_ids(messages);
    packets.write_ack(&Ack::new(ids.clone()).unwrap()).unwrap();
    for message in messages {
        packets.write_message(message).unwrap();
    }
    packets.write_offer(&Offer::new(ids).unwrap()).unwrap();
    packets.write_request(&request()).unwrap();
    packets
        .write_subscription_update(&subscription_update())
        .unwrap();
    packets.write_transport_update(&transport_update()).unwrap();
}

fn check_exchange<R: Read>(packets: &mut PacketReader<R>, messages: &[UnverifiedMessage]) {
    let ids = message_ids(messages);

    assert!(packets.has_ack().unwrap());
    assert_eq!(packets.read_ack().unwrap().message_ids(), ids.as_slice());

    for expected in messages {
        assert!(packets.has_message().unwrap());
        let message = packets.read_message().unwrap();
        assert_eq!(message.as_bytes(), expected.as_bytes());
    }

    assert!(packets.has_offer().unwrap());
    assert_eq!(packets.read_offer().unwrap().message_ids(), ids.as_slice());

    assert!(packets.has_request().unwrap());
    let request = packets.read_request().unwrap();
    assert_eq!(request.length(), 4);
    let bits: Vec<bool> = (0..4).map(|i| request.bitmap().get(i)).collect();
    assert_eq!(bits, vec![false, true, false, true]);

    assert!(packets.has_subscription_update().unwrap());
    let update = packets.read_subscription_update().unwrap();
    assert_eq!(update, subscription_update());
    assert_eq!(update.version(), 0);
    assert_eq!(
        update.subscriptions().keys().filter(|g| g.is_restricted()).count(),
        1
    );

    assert!(packets.has_transport_update().unwrap());
    let update = packets.read_transport_update().unwrap();
    assert_eq!(update.transports().len(), 1);
    assert_eq!(update.transports()[0].id().as_str(), "foo");
    assert_eq!(update.transports()[0].get("bar"), Some("baz"));
    assert_eq!(update.timestamp(), TIMESTAMP);

    assert!(packets.eof().unwrap());
}

#[test]
fn packets_survive_an_encrypted_stream() {
    let alice = context();
    let bob = alice.for_peer();
    let messages = messages();

    let mut packets = PacketWriter::new(ConnectionWriter::new(Vec::new(), &alice));
    write_exchange(&mut packets, &messages);
    let mut writer = packets.into_inner();
    writer.finish().unwrap();
    let wire = writer.into_inner();

    assert_eq!(&wire[..TAG_LENGTH], &alice.outgoing_tag());
    assert_eq!((wire.len() - TAG_LENGTH) % MAX_FRAME_LENGTH, 0);

    let mut input = Cursor::new(wire);
    let tag = read_tag(&mut input).unwrap().expect("stream starts with a tag");
    let mut recogniser = TagRecogniser::new();
    recogniser.add(bob);
    let ctx = recogniser.recognise(&tag).expect("tag should be recognised");
    assert_eq!(ctx.contact_id(), ContactId(1));
    assert!(recogniser.recognise(&tag).is_none());

    let mut packets = PacketReader::new(ConnectionReader::after_tag(input, &ctx));
    check_exchange(&mut packets, &messages);
}

#[test]
fn tampered_stream_is_rejected_as_format_error() {
    let alice = context();
    let mut packets = PacketWriter::new(ConnectionWriter::new(Vec::new(), &alice));
    write_exchange(&mut packets, &messages());
    let mut writer = packets.into_inner();
    writer.finish().unwrap();
    let mut wire = writer.into_inner();
    wire[TAG_LENGTH + MAX_FRAME_LENGTH + 10] ^= 0x01;

    let mut packets = PacketReader::new(ConnectionReader::new(Cursor::new(wire), &alice.for_peer()));
    let mut result = Ok(None);
    for _ in 0..16 {
        result = packets.read_packet();
        if !matches!(result, Ok(Some(_))) {
            break;
        }
    }
    assert!(result.unwrap_err().is_format());
}

#[test]
fn truncated_stream_is_rejected() {
    let alice = context();
    let mut packets = PacketWriter::new(ConnectionWriter::new(Vec::new(), &alice));
    write_exchange(&mut packets, &messages());
    let mut writer = packets.into_inner();
    writer.finish().unwrap();
    let mut wire = writer.into_inner();
    wire.truncate(wire.len() - MAX_FRAME_LENGTH);

    let mut packets = PacketReader::new(ConnectionReader::new(Cursor::new(wire), &alice.for_peer()));
    let err = loop {
        match packets.read_packet() {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("truncated stream must not end cleanly"),
            Err(err) => break err,
        }
    };
    assert!(err.is_format());
}

#[cfg(unix)]
#[test]
fn packets_cross_a_socket_connection() {
    use syncwire::transport::{SocketConfig, SocketConnection, TimeoutMonitor};

    let transport_id = TransportId::new("unix").unwrap();
    let (left, right) = SocketConnection::pair(transport_id, SocketConfig::default()).unwrap();
    let alice = context();
    let bob = alice.for_peer();
    let messages = messages();

    let sender_messages = messages.clone();
    let sender = thread::spawn(move || {
        let writer = ConnectionWriter::from_connection(&left, &alice).unwrap();
        let mut packets = PacketWriter::new(writer);
        write_exchange(&mut packets, &sender_messages);
        packets.into_inner().finish().unwrap();
        left.dispose(false, true).unwrap();
    });

    let monitor = TimeoutMonitor::default();
    let input = right
        .monitored_input_stream(&monitor, Duration::from_secs(30))
        .unwrap();
    assert_eq!(monitor.monitored_count(), 1);
    let mut packets = PacketReader::new(ConnectionReader::new(input, &bob));
    check_exchange(&mut packets, &messages);

    sender.join().unwrap();
    drop(packets);
    assert_eq!(monitor.monitored_count(), 0);
    right.dispose(false, true).unwrap();
}

#[test]
fn packets_cross_a_file_carrier() {
    let dir = tempfile::tempdir().unwrap();
    let plugin = FilePlugin::new(dir.path(), 1024 * 1024, Duration::from_secs(60));
    let alice = context();
    let bob = alice.for_peer();
    let messages = messages();

    let mut transport_writer = plugin.create_writer(ContactId(1)).unwrap().unwrap();
    let writer = ConnectionWriter::from_simplex(transport_writer.as_mut(), &alice).unwrap();
    assert!(writer.remaining_capacity() > 0);
    let mut packets = PacketWriter::new(writer);
    write_exchange(&mut packets, &messages);
    packets.into_inner().finish().unwrap();
    transport_writer.dispose(false).unwrap();

    assert!(plugin.create_writer(ContactId(1)).unwrap().is_none());

    let mut transport_reader = plugin.create_reader(ContactId(1)).unwrap().unwrap();
    let input = transport_reader.input_stream().unwrap();
    let mut packets = PacketReader::new(ConnectionReader::new(input, &bob));
    check_exchange(&mut packets, &messages);
    drop(packets);
    transport_reader.dispose(false, true).unwrap();

    assert!(plugin.create_reader(ContactId(1)).unwrap().is_none());
}
