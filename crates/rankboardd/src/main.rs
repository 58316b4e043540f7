use std::ffi::OsStr;

use anyhow::Result;
use clap::Parser;
use rankboardd::cli::Cli;
use rankboardd::logging::init_tracing;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    rankboardd::run(&cli, &mut out)
}

fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}
