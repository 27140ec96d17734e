use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::ids::{ContactId, TransportId};
use crate::plugin::{DuplexPlugin, DuplexPluginFactory, Plugin, PluginConfig};
use crate::timeout::{StreamCloser, TimeoutInputStream, TimeoutMonitor};
use crate::traits::{DuplexTransportConnection, InputStream, OutputStream};

/// Transport identifier of the TCP carrier.
pub const TCP_TRANSPORT_ID: &str = "tcp";

/// Config key prefix for contact addresses, e.g. `address.7 = 10.0.0.2:7000`.
pub const CONFIG_ADDRESS_PREFIX: &str = "address.";

/// Config key for the connect timeout in milliseconds.
pub const CONFIG_CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";

/// Config key for the carrier's maximum latency in milliseconds.
pub const CONFIG_MAX_LATENCY_MS: &str = "max_latency_ms";

/// Per-connection limits advertised to the layers above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    /// Maximum frame length in bytes.
    pub max_frame_length: usize,
    /// Maximum round-trip latency before the peer is considered gone.
    pub max_latency: Duration,
    /// Bound on a single outgoing connect attempt.
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_frame_length: 1024,
            max_latency: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

enum SocketInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl SocketInner {
    fn try_clone(&self) -> io::Result<Self> {
        match self {
            SocketInner::Tcp(stream) => stream.try_clone().map(SocketInner::Tcp),
            #[cfg(unix)]
            SocketInner::Unix(stream) => stream.try_clone().map(SocketInner::Unix),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        let result = match self {
            SocketInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            SocketInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Read for SocketInner {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SocketInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            SocketInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SocketInner {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SocketInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            SocketInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SocketInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            SocketInner::Unix(stream) => stream.flush(),
        }
    }
}

impl StreamCloser for SocketInner {
    fn close(&self) -> io::Result<()> {
        self.shutdown()
    }
}

/// A duplex connection over a stream socket.
///
/// The input and output streams are independent handles to the same socket,
/// so one thread can block reading while another writes. Disposing shuts the
/// socket down in both directions, which unblocks both.
pub struct SocketConnection {
    inner: SocketInner,
    transport_id: TransportId,
    config: SocketConfig,
    disposed: AtomicBool,
}

impl SocketConnection {
    pub fn from_tcp(stream: TcpStream, transport_id: TransportId, config: SocketConfig) -> Self {
        Self::from_inner(SocketInner::Tcp(stream), transport_id, config)
    }

    #[cfg(unix)]
    pub fn from_unix(
        stream: std::os::unix::net::UnixStream,
        transport_id: TransportId,
        config: SocketConfig,
    ) -> Self {
        Self::from_inner(SocketInner::Unix(stream), transport_id, config)
    }

    /// A connected pair over an anonymous Unix socket.
    #[cfg(unix)]
    pub fn pair(transport_id: TransportId, config: SocketConfig) -> Result<(Self, Self)> {
        let (a, b) = std::os::unix::net::UnixStream::pair()?;
        Ok((
            Self::from_unix(a, transport_id.clone(), config),
            Self::from_unix(b, transport_id, config),
        ))
    }

    fn from_inner(inner: SocketInner, transport_id: TransportId, config: SocketConfig) -> Self {
        Self {
            inner,
            transport_id,
            config,
            disposed: AtomicBool::new(false),
        }
    }

    /// Remote address for TCP connections.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            SocketInner::Tcp(stream) => stream.peer_addr().ok(),
            #[cfg(unix)]
            SocketInner::Unix(_) => None,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// An input stream that the monitor closes after `timeout` without data.
    pub fn monitored_input_stream(
        &self,
        monitor: &TimeoutMonitor,
        timeout: Duration,
    ) -> Result<TimeoutInputStream<InputStream>> {
        let input = self.input_stream()?;
        let closer = self.inner.try_clone()?;
        Ok(monitor.wrap(input, closer, timeout))
    }

    fn clone_handle(&self) -> Result<SocketInner> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }
        Ok(self.inner.try_clone()?)
    }
}

impl DuplexTransportConnection for SocketConnection {
    fn transport_id(&self) -> &TransportId {
        &self.transport_id
    }

    fn max_frame_length(&self) -> usize {
        self.config.max_frame_length
    }

    fn max_latency(&self) -> Duration {
        self.config.max_latency
    }

    fn input_stream(&self) -> Result<InputStream> {
        Ok(Box::new(self.clone_handle()?))
    }

    fn output_stream(&self) -> Result<OutputStream> {
        Ok(Box::new(self.clone_handle()?))
    }

    fn dispose(&self, exception: bool, recognised: bool) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(
            transport = %self.transport_id,
            exception,
            recognised,
            "disposing connection"
        );
        self.inner.shutdown()?;
        Ok(())
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            let _ = self.inner.shutdown();
        }
    }
}

/// TCP listener producing [`SocketConnection`]s.
pub struct TcpTransport {
    listener: TcpListener,
    addr: SocketAddr,
    config: SocketConfig,
}

impl TcpTransport {
    /// Bind and listen on `addr`. Port 0 picks a free port.
    pub fn bind(addr: SocketAddr, config: SocketConfig) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening on tcp");
        Ok(Self {
            listener,
            addr,
            config,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<SocketConnection> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(SocketConnection::from_tcp(
            stream,
            TransportId::builtin(TCP_TRANSPORT_ID),
            self.config,
        ))
    }

    /// Connect to a listening peer, bounded by the config's connect timeout.
    pub fn connect(addr: SocketAddr, config: SocketConfig) -> Result<SocketConnection> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected over tcp");
        Ok(SocketConnection::from_tcp(
            stream,
            TransportId::builtin(TCP_TRANSPORT_ID),
            config,
        ))
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// Duplex plugin that dials contacts at configured TCP addresses.
pub struct TcpPlugin {
    id: TransportId,
    config: SocketConfig,
    addresses: RwLock<HashMap<ContactId, SocketAddr>>,
    running: AtomicBool,
}

impl TcpPlugin {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            id: TransportId::builtin(TCP_TRANSPORT_ID),
            config,
            addresses: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Record (or replace) the address of a contact.
    pub fn set_address(&self, contact: ContactId, addr: SocketAddr) {
        self.addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(contact, addr);
    }

    pub fn address(&self, contact: ContactId) -> Option<SocketAddr> {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&contact)
            .copied()
    }
}

impl Plugin for TcpPlugin {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn max_latency(&self) -> Duration {
        self.config.max_latency
    }

    fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::Release);
        debug!(transport = %self.id, "plugin started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        debug!(transport = %self.id, "plugin stopped");
        Ok(())
    }
}

impl DuplexPlugin for TcpPlugin {
    fn create_connection(
        &self,
        contact: ContactId,
    ) -> Result<Option<Box<dyn DuplexTransportConnection>>> {
        if !self.running.load(Ordering::Acquire) {
            return Ok(None);
        }
        let Some(addr) = self.address(contact) else {
            debug!(%contact, "no tcp address for contact");
            return Ok(None);
        };
        let connection = TcpTransport::connect(addr, self.config)?;
        Ok(Some(Box::new(connection)))
    }
}

/// Builds a [`TcpPlugin`] from `address.<contact>` and timing keys.
pub struct TcpPluginFactory {
    id: TransportId,
}

impl TcpPluginFactory {
    pub fn new() -> Self {
        Self {
            id: TransportId::builtin(TCP_TRANSPORT_ID),
        }
    }
}

impl Default for TcpPluginFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_millis(config: &PluginConfig, key: &str) -> Result<Option<Duration>> {
    config
        .get(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| TransportError::InvalidConfig(format!("{key}: not a number: {raw}")))
        })
        .transpose()
}

impl DuplexPluginFactory for TcpPluginFactory {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn create_plugin(&self, config: &PluginConfig) -> Result<Option<Box<dyn DuplexPlugin>>> {
        let mut socket_config = SocketConfig::default();
        if let Some(timeout) = parse_millis(config, CONFIG_CONNECT_TIMEOUT_MS)? {
            socket_config.connect_timeout = timeout;
        }
        if let Some(latency) = parse_millis(config, CONFIG_MAX_LATENCY_MS)? {
            socket_config.max_latency = latency;
        }

        let plugin = TcpPlugin::new(socket_config);
        for (key, value) in config.iter() {
            let Some(contact) = key.strip_prefix(CONFIG_ADDRESS_PREFIX) else {
                continue;
            };
            let contact = contact.parse::<u32>().map_err(|_| {
                TransportError::InvalidConfig(format!("{key}: contact id is not a number"))
            })?;
            let addr = value.parse::<SocketAddr>().map_err(|_| {
                TransportError::InvalidConfig(format!("{key}: not a socket address: {value}"))
            })?;
            plugin.set_address(ContactId(contact), addr);
        }
        Ok(Some(Box::new(plugin)))
    }
}
