//! wgforge CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wgforge_cli::cli::{Cli, Commands, KeysCommands};
use wgforge_cli::commands::{run_build, run_check, run_keys_list, run_keys_remove};
use wgforge_cli::error::CliError;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Commands::Build { document, output } => {
            run_build(&mut stdout, document, output, &cli.db)
        }
        Commands::Check { document } => run_check(&mut stdout, document, cli.format),
        Commands::Keys { command } => match command {
            KeysCommands::List => run_keys_list(&mut stdout, &cli.db, cli.format),
            KeysCommands::Remove { node } => run_keys_remove(&mut stdout, &cli.db, node),
        },
    }
}
