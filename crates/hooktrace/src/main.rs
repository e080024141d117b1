mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command() {
        Commands::Run => commands::hook::run(),
        Commands::Drain => commands::drain::run(),
        Commands::Status => commands::status::run(),
        Commands::Version => commands::version::run(),
    }
}
