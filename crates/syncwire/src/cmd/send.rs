use std::collections::BTreeMap;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use syncwire_frame::{ConnectionContext, ConnectionWriter};
use syncwire_sync::{Offer, PacketWriter, Transport, TransportUpdate, UnverifiedMessage};
use syncwire_transport::{ContactId, DuplexTransportConnection, SocketConfig, TcpTransport};
use tracing::info;

use crate::cmd::{parse_duration, parse_secret, SendArgs};
use crate::exit::{frame_error, io_error, sync_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let secret = parse_secret(&args.connection.secret)?;
    let timeout = parse_duration(&args.timeout)?;
    let messages = resolve_messages(&args)?;
    let properties = parse_properties(&args.properties)?;

    let config = SocketConfig {
        connect_timeout: timeout,
        ..SocketConfig::default()
    };
    let connection = TcpTransport::connect(args.addr, config)
        .map_err(|err| transport_error("connect failed", err))?;
    let ctx = ConnectionContext::new(
        ContactId(args.connection.contact),
        connection.transport_id().clone(),
        secret,
        args.connection.stream,
        true,
    );

    let result = send_all(&connection, &ctx, &messages, properties);
    let _ = connection.dispose(result.is_err(), true);
    let (bytes_written, transports) = result?;

    info!(peer = %args.addr, messages = messages.len(), "stream finished");
    let summary = SendSummary {
        peer: args.addr.to_string(),
        messages: messages.iter().map(|m| m.id().to_string()).collect(),
        transports,
        bytes_written,
    };
    print_send_summary(&summary, format);
    Ok(SUCCESS)
}

/// Write the transport update, an offer and the messages, then finish the
/// stream. Returns bytes written and the number of transports advertised.
fn send_all(
    connection: &dyn DuplexTransportConnection,
    ctx: &ConnectionContext,
    messages: &[UnverifiedMessage],
    properties: BTreeMap<String, String>,
) -> CliResult<(u64, usize)> {
    let writer = ConnectionWriter::from_connection(connection, ctx)
        .map_err(|err| frame_error("open stream failed", err))?;
    let mut packets = PacketWriter::new(writer);

    let mut transports = 0;
    if !properties.is_empty() {
        let transport = Transport::new(connection.transport_id().clone(), properties)
            .map_err(|err| sync_error("invalid --property", err))?;
        let update = TransportUpdate::new(vec![transport], now_millis())
            .map_err(|err| sync_error("invalid --property", err))?;
        packets
            .write_transport_update(&update)
            .map_err(|err| sync_error("send failed", err))?;
        transports = 1;
    }

    if !messages.is_empty() {
        let offer = Offer::new(messages.iter().map(UnverifiedMessage::id).collect())
            .map_err(|err| sync_error("too many messages", err))?;
        packets
            .write_offer(&offer)
            .map_err(|err| sync_error("send failed", err))?;
    }
    for message in messages {
        packets
            .write_message(message)
            .map_err(|err| sync_error("send failed", err))?;
    }

    let mut writer = packets.into_inner();
    writer
        .finish()
        .map_err(|err| frame_error("finish failed", err))?;
    Ok((writer.bytes_written(), transports))
}

fn resolve_messages(args: &SendArgs) -> CliResult<Vec<UnverifiedMessage>> {
    let raw: Vec<Vec<u8>> = if let Some(path) = &args.file {
        vec![fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?]
    } else {
        args.messages.iter().map(|m| m.as_bytes().to_vec()).collect()
    };
    raw.into_iter()
        .map(|bytes| {
            UnverifiedMessage::new(bytes).map_err(|err| sync_error("invalid message", err))
        })
        .collect()
}

fn parse_properties(input: &[String]) -> CliResult<BTreeMap<String, String>> {
    input
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| CliError::usage(format!("--property must be KEY=VALUE: {pair}")))
        })
        .collect()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_need_an_equals_sign() {
        let parsed = parse_properties(&["address=10.0.0.1:7000".to_string()]).unwrap();
        assert_eq!(parsed.get("address").map(String::as_str), Some("10.0.0.1:7000"));
        assert!(parse_properties(&["address".to_string()]).is_err());
    }

    #[test]
    fn empty_messages_are_rejected() {
        assert!(UnverifiedMessage::new(Vec::new()).is_err());
        let err = sync_error("invalid message", UnverifiedMessage::new(Vec::new()).unwrap_err());
        assert_eq!(err.code, crate::exit::DATA_INVALID);
    }
}
