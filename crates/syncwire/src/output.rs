use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use syncwire_sync::{Packet, VerifiedMessage};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    kind: String,
    peer: &'a str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    timestamp: String,
}

/// Print one received packet. Messages are printed after verification.
pub fn print_packet(
    packet: &Packet,
    verified: Option<&VerifiedMessage>,
    peer: &str,
    format: OutputFormat,
) {
    let kind = packet.kind().to_string();
    let detail = describe(packet);
    let message_id = verified.map(|m| m.id().to_string());
    let payload = verified.map(|m| payload_preview(m.as_bytes()));

    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                kind,
                peer,
                detail,
                message_id,
                payload,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "PEER", "DETAIL", "PAYLOAD"])
                .add_row(vec![
                    kind,
                    peer.to_string(),
                    detail,
                    payload.unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match payload {
            Some(payload) => println!("{kind} from {peer}: {detail} payload={payload}"),
            None => println!("{kind} from {peer}: {detail}"),
        },
        OutputFormat::Raw => {
            if let Some(message) = verified {
                print_raw(message.as_bytes());
            }
        }
    }
}

#[derive(Serialize)]
struct SecretOutput<'a> {
    secret: &'a str,
    length: usize,
}

pub fn print_secret(secret_hex: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SecretOutput {
            secret: secret_hex,
            length: secret_hex.len() / 2,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["SECRET"])
                .add_row(vec![secret_hex]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{secret_hex}"),
    }
}

/// What a `send` invocation put on the wire.
#[derive(Serialize)]
pub struct SendSummary {
    pub peer: String,
    pub messages: Vec<String>,
    pub transports: usize,
    pub bytes_written: u64,
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "MESSAGES", "TRANSPORTS", "BYTES"])
                .add_row(vec![
                    summary.peer.clone(),
                    summary.messages.len().to_string(),
                    summary.transports.to_string(),
                    summary.bytes_written.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "sent {} messages to {} ({} bytes)",
                summary.messages.len(),
                summary.peer,
                summary.bytes_written
            );
            for id in &summary.messages {
                println!("  {id}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::Ack(ack) => format!("{} ids", ack.message_ids().len()),
        Packet::Offer(offer) => format!("{} ids", offer.message_ids().len()),
        Packet::Request(request) => format!(
            "{} of {} requested",
            request.bitmap().count_ones(),
            request.length()
        ),
        Packet::Message(message) => format!("{} bytes", message.as_bytes().len()),
        Packet::SubscriptionUpdate(update) => format!(
            "version {}, {} groups, {} removed",
            update.version(),
            update.subscriptions().len(),
            update.removed().len()
        ),
        Packet::TransportUpdate(update) => {
            let ids: Vec<&str> = update.transports().iter().map(|t| t.id().as_str()).collect();
            format!("transports [{}]", ids.join(", "))
        }
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
