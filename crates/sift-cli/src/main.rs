//! Sift CLI - Command-line interface for chunked document extraction.

use clap::Parser;
use sift_cli::commands;
use sift_cli::{Cli, Command, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output
    let filter = EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> sift_cli::Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::path()?,
    };
    let config = Config::load_from(&config_path)?;

    let mut stdout = std::io::stdout();
    match cli.command {
        Command::Extract(args) => commands::execute_extract(args, &config).await?,
        Command::Schema(args) => commands::execute_schema(args, &mut stdout)?,
        Command::Chunks(args) => commands::execute_chunks(args, &config, &mut stdout)?,
        Command::Config(args) => {
            commands::execute_config(args, &config, &config_path, &mut stdout)?
        }
    }

    Ok(())
}
