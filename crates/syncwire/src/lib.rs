//! Encrypted, framed sync connections between peers.
//!
//! syncwire moves sync packets between two peers that already share a
//! secret, over any carrier that can present itself as a duplex connection or
//! as one-shot simplex readers and writers.
//!
//! # Crate Structure
//!
//! - [`transport`]: Carrier abstraction, TCP and file carriers, timeout monitor
//! - [`frame`]: Key schedule and authenticated fixed-size frames
//! - [`sync`]: Sync packets and their reader and writer

/// Re-export transport types.
pub mod transport {
    pub use syncwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use syncwire_frame::*;
}

/// Re-export sync packet types.
pub mod sync {
    pub use syncwire_sync::*;
}
