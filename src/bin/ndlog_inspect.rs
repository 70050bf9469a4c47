//! `ndlog-inspect`: a small `structopt`-based CLI that opens a non-deterministic
//! event log and prints a JSON summary, in the same shape as `rd`'s own
//! trace-info subcommand.

use ndlog::commands::inspect_command::InspectCommand;
use ndlog::commands::Command;
use std::path::PathBuf;
use std::process;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "ndlog-inspect", about = "Summarize a non-deterministic event log")]
struct Opt {
    /// Path to the `*-rr-nondet.log` file
    #[structopt(parse(from_os_str))]
    log: PathBuf,
}

fn main() {
    let opt = Opt::from_args();
    let mut command = InspectCommand::new(opt.log);
    if let Err(e) = command.run() {
        eprintln!("ndlog-inspect: {}", e);
        process::exit(1);
    }
}
