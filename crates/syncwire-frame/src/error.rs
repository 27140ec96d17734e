use std::io;

/// Errors that can occur while encrypting or decrypting frames.
///
/// Every structural or cryptographic problem with incoming bytes is reported
/// as [`FrameError::Format`], without saying which check failed.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame failed authentication or violated the frame layout.
    #[error("invalid frame")]
    Format,

    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame was written after the final frame.
    #[error("final frame already written")]
    FinalFrameWritten,

    /// The payload does not fit in one frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame counter cannot advance without reusing a nonce.
    #[error("frame counter exhausted")]
    CounterExhausted,
}

impl FrameError {
    /// Recover a frame error that was carried through an `io::Error`.
    ///
    /// Used by callers that read frames through [`std::io::Read`].
    pub fn from_io(err: io::Error) -> Self {
        let is_format = err.kind() == io::ErrorKind::InvalidData
            && err
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<FrameError>())
                .is_some_and(|inner| matches!(inner, FrameError::Format));
        if is_format {
            FrameError::Format
        } else {
            FrameError::Io(err)
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, FrameError::Format)
    }
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(err) => err,
            FrameError::Format => io::Error::new(io::ErrorKind::InvalidData, FrameError::Format),
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

pub(crate) fn transport_to_frame_error(err: syncwire_transport::TransportError) -> FrameError {
    match err {
        syncwire_transport::TransportError::Io(io)
        | syncwire_transport::TransportError::Accept(io) => FrameError::Io(io),
        syncwire_transport::TransportError::Connect { source, .. }
        | syncwire_transport::TransportError::Bind { source, .. }
        | syncwire_transport::TransportError::File { source, .. } => FrameError::Io(source),
        other => FrameError::Io(io::Error::other(other.to_string())),
    }
}
