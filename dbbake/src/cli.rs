mod build;
mod fetch;

use clap::{Parser, Subcommand};

use crate::Result;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bake database export artifacts into a runnable container image
    #[command(arg_required_else_help = true)]
    Build(build::BuildArgs),

    /// Download an object-storage blob to a local file
    #[command(arg_required_else_help = true)]
    Fetch(fetch::FetchArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Build(args) => build::build(args),
            Commands::Fetch(args) => fetch::fetch(args),
        }
    }
}
