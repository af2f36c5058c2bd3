mod rio_daemon;

use log::error;
use rio_lib::Gfid;
use std::env;
use std::path::PathBuf;

use crate::rio_daemon::{
    run_rio_daemon, DaemonCommand, RioDaemonRunOptions, DEFAULT_CLUSTER_CONFIG_PATH,
};

fn usage() -> String {
    format!(
        "usage: rio_daemon [--config <path>] <command>\n\
         commands:\n\
         search <gfid>     show the metadata and data subvolume of a gfid\n\
         colocate <gfid>   derive a gfid in the same bucket\n\
         dump              show the bucket distribution of both layouts\n\
         selftest          run mkdir, create, write and a dirty lookup in process\n\
         defaults:\n\
         --config {}",
        DEFAULT_CLUSTER_CONFIG_PATH
    )
}

fn parse_args() -> Result<RioDaemonRunOptions, String> {
    let args = env::args().skip(1).collect::<Vec<String>>();
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        return Err(usage());
    }

    let mut config_path = PathBuf::from(DEFAULT_CLUSTER_CONFIG_PATH);
    let mut command = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config_path = PathBuf::from(value);
            }
            "search" | "colocate" => {
                let name = args[i].clone();
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("missing gfid for {}", name))?;
                let gfid = value.parse::<Gfid>().map_err(|e| e.to_string())?;
                command = Some(if name == "search" {
                    DaemonCommand::Search(gfid)
                } else {
                    DaemonCommand::Colocate(gfid)
                });
            }
            "dump" => command = Some(DaemonCommand::Dump),
            "selftest" => command = Some(DaemonCommand::Selftest),
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }

    let command = command.ok_or_else(usage)?;
    Ok(RioDaemonRunOptions {
        config_path,
        command,
    })
}

fn main() {
    env_logger::init();
    let options = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    match run_rio_daemon(options) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            error!("run rio_daemon failed: {}", err);
            std::process::exit(1);
        }
    }
}
