use std::fmt;
use std::io;

use syncwire_frame::FrameError;
use syncwire_sync::SyncError;
use syncwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::File { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidConfig(_) => CliError::usage(format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Format | FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn sync_error(context: &str, err: SyncError) -> CliError {
    match err {
        SyncError::Io(source) => io_error(context, source),
        SyncError::Frame(err) => frame_error(context, err),
        SyncError::Format(_) | SyncError::UnexpectedPacket { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SyncError::PacketTooLarge { .. } => CliError::usage(format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_map_to_data_invalid() {
        let err = sync_error("read", SyncError::Format("bad".into()));
        assert_eq!(err.code, DATA_INVALID);
        let err = sync_error("read", SyncError::Frame(FrameError::Format));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn io_kinds_map_to_codes() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(io_error("connect", timeout).code, TIMEOUT);
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "no");
        assert_eq!(
            transport_error(
                "connect",
                TransportError::Connect {
                    addr: "127.0.0.1:1".parse().unwrap(),
                    source: refused,
                }
            )
            .code,
            FAILURE
        );
        assert_eq!(transport_error("x", TransportError::Disposed).code, TRANSPORT_ERROR);
    }
}
