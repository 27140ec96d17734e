//! Sync protocol packets.
//!
//! Peers exchange six kinds of packet over the decrypted payload stream of a
//! connection: acknowledgements, offers, requests, raw messages, subscription
//! updates and transport updates. Each packet is a kind byte, a big-endian
//! `u32` body length and the body, so packets may straddle frame boundaries
//! freely.
//!
//! ```no_run
//! use std::io::Cursor;
//! use syncwire_sync::{Ack, MessageId, PacketReader, PacketWriter};
//!
//! let mut writer = PacketWriter::new(Vec::new());
//! let ack = Ack::new(vec![MessageId::for_message(b"hello")])?;
//! writer.write_ack(&ack)?;
//!
//! let mut reader = PacketReader::new(Cursor::new(writer.into_inner()));
//! assert_eq!(reader.read_ack()?, ack);
//! # Ok::<(), syncwire_sync::SyncError>(())
//! ```

pub mod bitmap;
pub mod codec;
pub mod error;
pub mod packet;
pub mod reader;
pub mod verifier;
pub mod writer;

pub use bitmap::Bitmap;
pub use error::{Result, SyncError};
pub use packet::{
    Ack, Group, GroupId, MessageId, Offer, Packet, PacketKind, Request, SubscriptionUpdate,
    Transport, TransportUpdate, UnverifiedMessage, MAX_IDS_PER_PACKET, MAX_PACKET_LENGTH,
    MAX_SUBSCRIPTIONS, MAX_TRANSPORTS, PACKET_HEADER_LENGTH, UNIQUE_ID_LENGTH,
};
pub use reader::{PacketReader, ReaderConfig};
pub use verifier::{DigestVerifier, MessageVerifier, VerifiedMessage};
pub use writer::PacketWriter;
