//! CLI commands, one module per subcommand — just a single command here,
//! since `ndlog-inspect` only ever does one thing.

use std::io;

pub mod inspect_command;

pub trait Command {
    fn run(&mut self) -> io::Result<()>;
}
