use crate::command::Command;
use clap::Parser;

#[derive(Parser)]
#[command(name = "txfs", version, about = "Apply file system plans as one transaction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}
