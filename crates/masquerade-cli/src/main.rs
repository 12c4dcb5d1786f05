mod config_cmd;
mod connection;
mod error;
mod logging;
mod output;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use config_cmd::ConfigCommand;
use error::CliResult;
use logging::init_logging;
use run::RunArgs;

#[derive(Parser, Debug)]
#[command(
    name = "masquerade",
    version,
    about = "Anonymize database tables from a YAML configuration"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Append JSON log lines to this file.
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a configuration to a database.
    Run(RunArgs),
    /// Generate or validate configuration files.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    match cli.command {
        Command::Run(args) => run::run(args).await,
        Command::Config(command) => config_cmd::run(command).await,
    }
}
