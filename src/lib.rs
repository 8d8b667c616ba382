#![doc = include_str!("../README.md")]

pub mod cli;
pub mod command;
pub mod error;
pub mod handle;
pub mod journal;
pub mod path;
pub mod plan;
pub mod registry;
pub mod session;
pub mod storage;

pub use error::*;
pub use handle::{Directory, File};
pub use plan::{Plan, Step};
pub use registry::{EntryId, Witness};
pub use session::Session;
pub use storage::{Kind, LocalStorage, MemoryStorage, Metadata, Storage};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() -> Result<()> {
    use clap::Parser;
    use command::Command;

    let cli = cli::Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Command::Apply(args) => command::apply::execute(args),
    }
}
