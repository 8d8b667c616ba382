pub mod apply;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Apply a TOML plan of file operations, committing only if every step succeeds.
    Apply(apply::ApplyArgs),
}
