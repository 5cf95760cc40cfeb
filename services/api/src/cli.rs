use crate::commands::{run_import, run_preview, ImportFileArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use resident_import::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Resident Import",
    about = "Preview, import, and serve bulk resident CSV uploads",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with resident CSV files directly, without the HTTP layer
    Import {
        #[command(subcommand)]
        command: ImportCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ImportCommand {
    /// Validate a CSV file and print the per-row report; nothing is stored
    Preview(ImportFileArgs),
    /// Import a CSV file into the configured resident store and print the outcome
    Run(ImportFileArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import {
            command: ImportCommand::Preview(args),
        } => run_preview(args).await,
        Command::Import {
            command: ImportCommand::Run(args),
        } => run_import(args).await,
    }
}
