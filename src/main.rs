use std::process::ExitCode;

use annotate::cli::{self, CliArgs};
use annotate::logger;
use clap::Parser;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init(args.verbose);
    cli::run(args)
}
