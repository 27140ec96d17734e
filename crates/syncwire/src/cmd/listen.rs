use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use syncwire_frame::{ConnectionContext, ConnectionReader};
use syncwire_sync::{
    DigestVerifier, MessageVerifier, Packet, PacketReader, SyncError, MAX_PACKET_LENGTH,
};
use syncwire_transport::{
    ContactId, DuplexTransportConnection, SocketConfig, TcpTransport, TimeoutMonitor,
};
use tracing::{info, warn};

use crate::cmd::{parse_duration, parse_secret, ListenArgs};
use crate::exit::{sync_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let secret = parse_secret(&args.connection.secret)?;
    let idle_timeout = parse_duration(&args.idle_timeout)?;
    let transport = TcpTransport::bind(args.addr, SocketConfig::default())
        .map_err(|err| transport_error("bind failed", err))?;
    info!(addr = %transport.local_addr(), "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let monitor = TimeoutMonitor::default();
    let verifier = DigestVerifier::new(MAX_PACKET_LENGTH);
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let connection = transport
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let peer = connection
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let ctx = ConnectionContext::new(
            ContactId(args.connection.contact),
            connection.transport_id().clone(),
            secret.clone(),
            args.connection.stream,
            false,
        );

        let input = connection
            .monitored_input_stream(&monitor, idle_timeout)
            .map_err(|err| transport_error("open stream failed", err))?;
        let mut packets = PacketReader::new(ConnectionReader::new(input, &ctx));
        let outcome = print_packets(&mut packets, &verifier, &peer, format, &running, || {
            printed = printed.saturating_add(1);
            args.count.is_some_and(|count| printed >= count)
        });

        match outcome {
            Ok(done) => {
                let _ = connection.dispose(false, true);
                if done {
                    return Ok(SUCCESS);
                }
            }
            Err(err) if err.is_format() => {
                warn!(%peer, error = %err, "dropping invalid stream");
                let _ = connection.dispose(true, false);
            }
            Err(err) => {
                let _ = connection.dispose(true, true);
                return Err(sync_error("receive failed", err));
            }
        }
    }

    Ok(SUCCESS)
}

/// Print packets until the stream ends. `on_printed` is called after each
/// packet and returns `true` once the listener should exit.
fn print_packets<R: Read>(
    packets: &mut PacketReader<R>,
    verifier: &dyn MessageVerifier,
    peer: &str,
    format: OutputFormat,
    running: &AtomicBool,
    mut on_printed: impl FnMut() -> bool,
) -> Result<bool, SyncError> {
    while running.load(Ordering::SeqCst) {
        let Some(packet) = packets.read_packet()? else {
            info!(%peer, "stream finished");
            return Ok(false);
        };
        let verified = match &packet {
            Packet::Message(message) => Some(verifier.verify(message.clone())?),
            _ => None,
        };
        print_packet(&packet, verified.as_ref(), peer, format);
        if on_printed() {
            return Ok(true);
        }
    }
    Ok(true)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
