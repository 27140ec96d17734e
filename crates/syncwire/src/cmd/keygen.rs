use rand::rngs::OsRng;
use rand::RngCore;
use syncwire_frame::KEY_LENGTH;

use crate::cmd::KeygenArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_secret, OutputFormat};

pub fn run(_args: KeygenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut secret = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut secret);
    print_secret(&hex::encode(secret), format);
    Ok(SUCCESS)
}
