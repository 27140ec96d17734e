use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::ids::TransportId;

/// Boxed input stream handed out by a connection.
pub type InputStream = Box<dyn Read + Send>;

/// Boxed output stream handed out by a connection.
pub type OutputStream = Box<dyn Write + Send>;

/// Reading and writing over a duplex carrier.
///
/// The connection does not encrypt or authenticate anything; it only moves
/// bytes. The input and output streams may be used from two threads at once,
/// and [`dispose`](Self::dispose) may be called while either is blocked, in
/// which case the blocked call fails or returns end-of-stream promptly.
pub trait DuplexTransportConnection: Send + Sync {
    /// The carrier this connection belongs to.
    fn transport_id(&self) -> &TransportId;

    /// Maximum frame length of the carrier in bytes.
    fn max_frame_length(&self) -> usize;

    /// Upper bound on round-trip time before the peer should be considered
    /// unresponsive.
    fn max_latency(&self) -> Duration;

    /// Returns a stream for reading from the connection.
    fn input_stream(&self) -> Result<InputStream>;

    /// Returns a stream for writing to the connection.
    fn output_stream(&self) -> Result<OutputStream>;

    /// Closes the connection and frees the carrier's resources.
    ///
    /// `exception` marks an abnormal closure. `recognised` says whether the
    /// remote peer was identified, which a carrier may use to decide whether
    /// to retry or forget the address. Only the first call has any effect.
    fn dispose(&self, exception: bool, recognised: bool) -> Result<()>;
}

/// One-shot reader over a simplex carrier.
pub trait SimplexTransportReader: Send {
    fn transport_id(&self) -> &TransportId;

    /// Returns the stream to read the whole transfer from.
    fn input_stream(&mut self) -> Result<InputStream>;

    /// Releases the carrier. Only the first call has any effect.
    fn dispose(&mut self, exception: bool, recognised: bool) -> Result<()>;
}

/// One-shot writer over a simplex carrier.
pub trait SimplexTransportWriter: Send {
    fn transport_id(&self) -> &TransportId;

    /// Number of bytes the carrier can accept in this transfer.
    fn capacity(&self) -> u64;

    fn max_latency(&self) -> Duration;

    /// Returns the stream to write the whole transfer to.
    fn output_stream(&mut self) -> Result<OutputStream>;

    /// Releases the carrier. Only the first call has any effect.
    fn dispose(&mut self, exception: bool) -> Result<()>;
}
