//! Carrier-independent transport connections.
//!
//! Every physical carrier presents one of two shapes to the layers above:
//! - a duplex connection with an input and an output stream
//!   ([`DuplexTransportConnection`])
//! - one-shot simplex readers and writers ([`SimplexTransportReader`],
//!   [`SimplexTransportWriter`])
//!
//! The [`TimeoutMonitor`] bounds how long a wrapped input stream may go
//! without producing data, using one shared periodic sweep.
//!
//! This is the lowest layer of syncwire. It never looks at the bytes it
//! carries; encryption and framing happen in `syncwire-frame`.

pub mod clock;
pub mod error;
pub mod file;
pub mod ids;
pub mod plugin;
pub mod scheduler;
pub mod socket;
pub mod timeout;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use error::{Result, TransportError};
pub use file::{FilePlugin, FilePluginFactory};
pub use ids::{ContactId, TransportId};
pub use plugin::{
    DuplexPlugin, DuplexPluginFactory, Plugin, PluginConfig, SimplexPlugin, SimplexPluginFactory,
};
pub use scheduler::{ScheduledTask, Scheduler, ThreadScheduler};
pub use socket::{SocketConfig, SocketConnection, TcpPlugin, TcpPluginFactory, TcpTransport};
pub use timeout::{StreamCloser, TimeoutInputStream, TimeoutMonitor, TimeoutMonitorConfig};
pub use traits::{
    DuplexTransportConnection, InputStream, OutputStream, SimplexTransportReader,
    SimplexTransportWriter,
};

#[cfg(feature = "async")]
pub use scheduler::TokioScheduler;
