use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use syncwire_transport::TransportId;

use crate::bitmap::Bitmap;
use crate::error::{Result, SyncError};

/// Length of message and group identifiers.
pub const UNIQUE_ID_LENGTH: usize = 32;

/// Packet header: kind (1) + body length (4 BE).
pub const PACKET_HEADER_LENGTH: usize = 5;

/// Largest packet body a reader will buffer.
pub const MAX_PACKET_LENGTH: usize = 64 * 1024;

/// Most message identifiers an Ack, Offer or Request can cover.
pub const MAX_IDS_PER_PACKET: usize = (MAX_PACKET_LENGTH - 2) / UNIQUE_ID_LENGTH;

/// Most groups a subscription update can list.
pub const MAX_SUBSCRIPTIONS: usize = 300;

/// Longest group name, in UTF-8 bytes.
pub const MAX_GROUP_NAME_LENGTH: usize = 50;

/// Longest group public key, in bytes.
pub const MAX_PUBLIC_KEY_LENGTH: usize = 120;

/// Most transports a transport update can list.
pub const MAX_TRANSPORTS: usize = 25;

/// Most properties a single transport can carry.
pub const MAX_PROPERTIES_PER_TRANSPORT: usize = 100;

/// Longest property key or value, in UTF-8 bytes.
pub const MAX_PROPERTY_LENGTH: usize = 100;

macro_rules! unique_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; UNIQUE_ID_LENGTH]);

        impl $name {
            pub const fn new(bytes: [u8; UNIQUE_ID_LENGTH]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; UNIQUE_ID_LENGTH] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for byte in &self.0[..4] {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, "..)")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    };
}

unique_id!(
    /// Identifies a message by the hash of its serialized bytes.
    MessageId
);

unique_id!(
    /// Identifies a group.
    GroupId
);

impl MessageId {
    /// The identifier of a serialized message: its SHA-256 digest.
    pub fn for_message(raw: &[u8]) -> Self {
        Self(Sha256::digest(raw).into())
    }
}

/// Discriminator at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Ack = 0,
    Message = 1,
    Offer = 2,
    Request = 3,
    SubscriptionUpdate = 4,
    TransportUpdate = 5,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Ack),
            1 => Some(PacketKind::Message),
            2 => Some(PacketKind::Offer),
            3 => Some(PacketKind::Request),
            4 => Some(PacketKind::SubscriptionUpdate),
            5 => Some(PacketKind::TransportUpdate),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Ack => "ack",
            PacketKind::Message => "message",
            PacketKind::Offer => "offer",
            PacketKind::Request => "request",
            PacketKind::SubscriptionUpdate => "subscription update",
            PacketKind::TransportUpdate => "transport update",
        };
        f.write_str(name)
    }
}

fn check_ids(kind: PacketKind, ids: &[MessageId]) -> Result<()> {
    if ids.is_empty() || ids.len() > MAX_IDS_PER_PACKET {
        return Err(SyncError::format(format!(
            "{kind} must carry 1..={MAX_IDS_PER_PACKET} ids, got {}",
            ids.len()
        )));
    }
    Ok(())
}

/// Acknowledges receipt of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    message_ids: Vec<MessageId>,
}

impl Ack {
    pub fn new(message_ids: Vec<MessageId>) -> Result<Self> {
        check_ids(PacketKind::Ack, &message_ids)?;
        Ok(Self { message_ids })
    }

    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }
}

/// Lists messages the sender can send, in the order a Request refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    message_ids: Vec<MessageId>,
}

impl Offer {
    pub fn new(message_ids: Vec<MessageId>) -> Result<Self> {
        check_ids(PacketKind::Offer, &message_ids)?;
        Ok(Self { message_ids })
    }

    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }
}

/// Selects messages from the most recent Offer: bit `i` requests the
/// offer's `i`th message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    bitmap: Bitmap,
}

impl Request {
    pub fn new(bitmap: Bitmap) -> Result<Self> {
        if bitmap.is_empty() || bitmap.len() > MAX_IDS_PER_PACKET {
            return Err(SyncError::format(format!(
                "request must cover 1..={MAX_IDS_PER_PACKET} messages, got {}",
                bitmap.len()
            )));
        }
        Ok(Self { bitmap })
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Number of offered messages the request covers.
    pub fn length(&self) -> usize {
        self.bitmap.len()
    }

    /// The offered ids this request selects.
    ///
    /// Bits beyond the end of `offer` are ignored.
    pub fn requested<'a>(&'a self, offer: &'a Offer) -> impl Iterator<Item = MessageId> + 'a {
        self.bitmap
            .iter_ones()
            .filter_map(|i| offer.message_ids().get(i).copied())
    }
}

/// A group a peer may subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Group {
    id: GroupId,
    name: String,
    public_key: Option<Vec<u8>>,
}

impl Group {
    /// Create a group. A group with a public key is restricted: only holders
    /// of the private key may post to it.
    pub fn new(id: GroupId, name: impl Into<String>, public_key: Option<Vec<u8>>) -> Result<Self> {
        let name = name.into();
        if name.len() > MAX_GROUP_NAME_LENGTH {
            return Err(SyncError::format(format!(
                "group name is {} bytes, max {MAX_GROUP_NAME_LENGTH}",
                name.len()
            )));
        }
        if let Some(key) = &public_key {
            if key.len() > MAX_PUBLIC_KEY_LENGTH {
                return Err(SyncError::format(format!(
                    "group key is {} bytes, max {MAX_PUBLIC_KEY_LENGTH}",
                    key.len()
                )));
            }
        }
        Ok(Self {
            id,
            name,
            public_key,
        })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn public_key(&self) -> Option<&[u8]> {
        self.public_key.as_deref()
    }

    pub fn is_restricted(&self) -> bool {
        self.public_key.is_some()
    }
}

/// Reports which groups the sender subscribes to.
///
/// `version` orders updates from the same peer; a receiver ignores an update
/// older than one it has already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    removed: BTreeSet<GroupId>,
    subscriptions: BTreeMap<Group, u64>,
    version: u64,
    timestamp: u64,
}

impl SubscriptionUpdate {
    /// `subscriptions` maps each current group to the version at which the
    /// subscription started.
    pub fn new(
        removed: BTreeSet<GroupId>,
        subscriptions: BTreeMap<Group, u64>,
        version: u64,
        timestamp: u64,
    ) -> Result<Self> {
        if removed.len() > MAX_SUBSCRIPTIONS || subscriptions.len() > MAX_SUBSCRIPTIONS {
            return Err(SyncError::format(format!(
                "subscription update lists more than {MAX_SUBSCRIPTIONS} groups"
            )));
        }
        let mut ids = BTreeSet::new();
        for group in subscriptions.keys() {
            if !ids.insert(group.id()) {
                return Err(SyncError::format(format!("group {} listed twice", group.id())));
            }
        }
        Ok(Self {
            removed,
            subscriptions,
            version,
            timestamp,
        })
    }

    pub fn removed(&self) -> &BTreeSet<GroupId> {
        &self.removed
    }

    pub fn subscriptions(&self) -> &BTreeMap<Group, u64> {
        &self.subscriptions
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Reachability properties for one transport, e.g. `address -> host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    id: TransportId,
    properties: BTreeMap<String, String>,
}

impl Transport {
    pub fn new(id: TransportId, properties: BTreeMap<String, String>) -> Result<Self> {
        if properties.len() > MAX_PROPERTIES_PER_TRANSPORT {
            return Err(SyncError::format(format!(
                "transport {id} has {} properties, max {MAX_PROPERTIES_PER_TRANSPORT}",
                properties.len()
            )));
        }
        for (key, value) in &properties {
            if key.len() > MAX_PROPERTY_LENGTH || value.len() > MAX_PROPERTY_LENGTH {
                return Err(SyncError::format(format!(
                    "transport {id} property {key:?} exceeds {MAX_PROPERTY_LENGTH} bytes"
                )));
            }
        }
        Ok(Self { id, properties })
    }

    pub fn id(&self) -> &TransportId {
        &self.id
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Advertises how the sender can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportUpdate {
    transports: Vec<Transport>,
    timestamp: u64,
}

impl TransportUpdate {
    pub fn new(transports: Vec<Transport>, timestamp: u64) -> Result<Self> {
        if transports.len() > MAX_TRANSPORTS {
            return Err(SyncError::format(format!(
                "transport update lists {} transports, max {MAX_TRANSPORTS}",
                transports.len()
            )));
        }
        let mut ids = BTreeSet::new();
        for transport in &transports {
            if !ids.insert(transport.id()) {
                return Err(SyncError::format(format!(
                    "transport {} listed twice",
                    transport.id()
                )));
            }
        }
        Ok(Self {
            transports,
            timestamp,
        })
    }

    pub fn transports(&self) -> &[Transport] {
        &self.transports
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// A serialized message that has not yet been verified.
///
/// The sync layer never looks inside; see
/// [`MessageVerifier`](crate::verifier::MessageVerifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedMessage {
    raw: Bytes,
}

impl UnverifiedMessage {
    pub fn new(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_PACKET_LENGTH {
            return Err(SyncError::format(format!(
                "message must be 1..={MAX_PACKET_LENGTH} bytes, got {}",
                raw.len()
            )));
        }
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    /// Identifier the message will have once verified.
    pub fn id(&self) -> MessageId {
        MessageId::for_message(&self.raw)
    }
}

/// Any sync packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Ack(Ack),
    Message(UnverifiedMessage),
    Offer(Offer),
    Request(Request),
    SubscriptionUpdate(SubscriptionUpdate),
    TransportUpdate(TransportUpdate),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Ack(_) => PacketKind::Ack,
            Packet::Message(_) => PacketKind::Message,
            Packet::Offer(_) => PacketKind::Offer,
            Packet::Request(_) => PacketKind::Request,
            Packet::SubscriptionUpdate(_) => PacketKind::SubscriptionUpdate,
            Packet::TransportUpdate(_) => PacketKind::TransportUpdate,
        }
    }
}
