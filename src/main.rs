// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, GatewayCommands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Gateway { command }) => run_gateway_command(command).await,
        Some(Commands::Completions { shell }) => {
            cli::print_completions(shell);
            Ok(())
        }
        None => {
            eprintln!("no subcommand given — try `egret gateway serve` or `egret --help`");
            Ok(())
        }
    }
}

async fn run_gateway_command(command: GatewayCommands) -> anyhow::Result<()> {
    match command {
        GatewayCommands::Serve { config, token_path } => {
            let config = egret_config::load(config.as_deref())?;
            let token_path = resolve_token_path(token_path, &config);
            egret_gateway::run(config, token_path).await
        }
        GatewayCommands::RegenerateToken { config, token_path } => {
            let config = egret_config::load(config.as_deref())?;
            let token_path = resolve_token_path(token_path, &config);
            let raw = egret_gateway::token::RawToken::generate();
            println!("Bearer token: {}", raw.as_str());
            egret_gateway::token::StoredTokenFile::write(&token_path, &raw.into_stored())?;
            println!("(the previous token at {} is now invalid)", token_path.display());
            Ok(())
        }
        GatewayCommands::ShowConfig { config } => {
            let config = egret_config::load(config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
    }
}

/// `--token-path` wins over `http.token_path` in config, which wins over
/// the default `~/.local/share/egret/token.yaml`.
fn resolve_token_path(explicit: Option<PathBuf>, config: &egret_config::Config) -> PathBuf {
    if let Some(p) = explicit {
        return p;
    }
    if let Some(p) = &config.http.token_path {
        return PathBuf::from(p);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("egret")
        .join("token.yaml")
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
