use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("syncwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: syncwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SYNCWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("SYNCWIRE_GIT_HASH").unwrap_or("unknown"));
    println!(
        "wire: frame={} bytes, payload={} bytes, max_packet={} bytes",
        syncwire_frame::MAX_FRAME_LENGTH,
        syncwire_frame::MAX_PAYLOAD_LENGTH,
        syncwire_sync::MAX_PACKET_LENGTH
    );
    println!("features: async={}, cli=true", cfg!(feature = "async"));

    Ok(SUCCESS)
}
