use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hooktrace")]
#[command(version)]
#[command(about = "Export assistant session turns as traces to Langfuse and OTLP backends")]
pub struct Cli {
    /// Defaults to `run` when omitted, as the Stop hook invokes it
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Drain the retry queue, then trace new turns of recently modified sessions
    Run,

    /// Only retry queued records
    Drain,

    /// Print queue and checkpoint state as JSON
    Status,

    /// Print version information
    Version,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}
