use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rpctunnel {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rpctunnel");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RPCTUNNEL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("RPCTUNNEL_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("jsonrpc: {}", rpctunnel_rpc::JSONRPC_VERSION);
    println!("proxy_method: {}", rpctunnel_http::PROXY_METHOD);
    println!(
        "max_frame_payload: {}",
        rpctunnel_channel::DEFAULT_MAX_PAYLOAD
    );

    Ok(SUCCESS)
}
