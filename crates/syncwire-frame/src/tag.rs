use std::collections::HashMap;
use std::io::{ErrorKind, Read};

use syncwire_transport::ContactId;
use tracing::debug;

use crate::constants::TAG_LENGTH;
use crate::error::{FrameError, Result};
use crate::keys::ConnectionContext;

/// Read the stream tag that precedes frame 0.
///
/// Returns `Ok(None)` if the stream ends before any byte arrives. A stream
/// that ends partway through the tag is a format error.
pub fn read_tag<R: Read>(inner: &mut R) -> Result<Option<[u8; TAG_LENGTH]>> {
    let mut tag = [0u8; TAG_LENGTH];
    let mut filled = 0;
    while filled < TAG_LENGTH {
        match inner.read(&mut tag[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                debug!(bytes = filled, "stream ended inside tag");
                return Err(FrameError::Format);
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(Some(tag))
}

/// Maps expected incoming tags to the connections they open.
///
/// A listener registers the context of every connection it is willing to
/// accept, reads the tag of each incoming stream, and looks it up here to
/// learn which contact is on the other end.
#[derive(Debug, Default)]
pub struct TagRecogniser {
    expected: HashMap<[u8; TAG_LENGTH], ConnectionContext>,
}

impl TagRecogniser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect the peer of `ctx` to open a stream.
    pub fn add(&mut self, ctx: ConnectionContext) {
        self.expected.insert(ctx.incoming_tag(), ctx);
    }

    /// Stop expecting streams from `contact`.
    pub fn remove_contact(&mut self, contact: ContactId) {
        self.expected.retain(|_, ctx| ctx.contact_id() != contact);
    }

    /// Look up and consume the context for `tag`.
    ///
    /// Each tag opens one stream, so a recognised tag is forgotten.
    pub fn recognise(&mut self, tag: &[u8; TAG_LENGTH]) -> Option<ConnectionContext> {
        let ctx = self.expected.remove(tag);
        match &ctx {
            Some(ctx) => debug!(contact = %ctx.contact_id(), "recognised stream tag"),
            None => debug!("unrecognised stream tag"),
        }
        ctx
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}
