use std::io;

use syncwire_frame::FrameError;

use crate::packet::PacketKind;

/// Errors that can occur while reading or writing sync packets.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The peer sent bytes that do not form a valid packet, or the frame
    /// stream carrying them was invalid.
    #[error("invalid packet: {0}")]
    Format(String),

    /// A packet was too large to encode.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The next packet is not of the kind the caller asked for.
    #[error("expected {expected} packet, found {found}")]
    UnexpectedPacket {
        expected: PacketKind,
        found: PacketKind,
    },

    /// An I/O error occurred on the payload stream.
    #[error("sync I/O error: {0}")]
    Io(io::Error),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl SyncError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        SyncError::Format(reason.into())
    }

    pub fn is_format(&self) -> bool {
        matches!(self, SyncError::Format(_) | SyncError::Frame(FrameError::Format))
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        match FrameError::from_io(err) {
            FrameError::Format => SyncError::format("invalid frame"),
            FrameError::Io(err) => SyncError::Io(err),
            other => SyncError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_format_errors_become_format_errors() {
        let io_err: io::Error = FrameError::Format.into();
        assert!(matches!(SyncError::from(io_err), SyncError::Format(_)));
    }

    #[test]
    fn other_io_errors_stay_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(SyncError::from(io_err), SyncError::Io(_)));
    }
}
