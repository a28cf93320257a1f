use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("dltwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: dltwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("DLTWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("DLTWIRE_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: buffer={}, daemon={}, cli=true",
        cfg!(feature = "buffer"),
        cfg!(feature = "daemon")
    );
    println!(
        "timers: {}",
        if cfg!(target_os = "linux") {
            "timerfd"
        } else {
            "unavailable"
        }
    );

    Ok(SUCCESS)
}
