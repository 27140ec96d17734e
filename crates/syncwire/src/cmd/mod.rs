use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use syncwire_frame::{SecretKey, KEY_LENGTH};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod keygen;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a random shared secret.
    Keygen(KeygenArgs),
    /// Connect to a peer and send messages.
    Send(SendArgs),
    /// Accept connections and print received packets.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Keygen(args) => keygen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Options naming the connection both peers agree on.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Shared secret as 64 hex characters.
    #[arg(long, env = "SYNCWIRE_SECRET", hide_env_values = true)]
    pub secret: String,
    /// Local handle for the peer.
    #[arg(long, default_value = "0")]
    pub contact: u32,
    /// Stream number; each stream under one secret must use a new number.
    #[arg(long, default_value = "0")]
    pub stream: u64,
}

#[derive(Args, Debug)]
pub struct KeygenArgs {}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Peer address, e.g. 127.0.0.1:7000.
    pub addr: SocketAddr,
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Message to send (repeatable).
    #[arg(long = "message", short = 'm', conflicts_with = "file")]
    pub messages: Vec<String>,
    /// Send the contents of a file as one message.
    #[arg(long, conflicts_with = "messages")]
    pub file: Option<PathBuf>,
    /// Advertise a TCP transport property, KEY=VALUE (repeatable).
    #[arg(long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind, e.g. 127.0.0.1:7000.
    pub addr: SocketAddr,
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Close a connection that sends nothing for this long (e.g. 30s).
    #[arg(long, default_value = "60s")]
    pub idle_timeout: String,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_secret(input: &str) -> CliResult<SecretKey> {
    let bytes = hex::decode(input.trim())
        .map_err(|err| CliError::usage(format!("--secret is not valid hex: {err}")))?;
    SecretKey::from_slice(&bytes).ok_or_else(|| {
        CliError::usage(format!(
            "--secret must be {KEY_LENGTH} bytes, got {}",
            bytes.len()
        ))
    })
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
