// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// `egret gateway` subcommands.
#[derive(Subcommand, Debug)]
pub enum GatewayCommands {
    /// Start the HTTP gateway (session core + action endpoint).
    ///
    /// A bearer token is generated on first run and printed once; save it,
    /// since it is never shown again. Clients authenticate with
    /// `Authorization: Bearer <token>`.
    Serve {
        /// Path to the gateway config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the stored bearer-token file (overrides config).
        #[arg(long)]
        token_path: Option<PathBuf>,
    },

    /// Regenerate the HTTP bearer token.
    ///
    /// The new token is printed once. The old token is immediately invalid.
    RegenerateToken {
        /// Path to the gateway config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Path to the stored bearer-token file (overrides config).
        #[arg(long)]
        token_path: Option<PathBuf>,
    },

    /// Print the effective gateway configuration and exit.
    ShowConfig {
        /// Path to the gateway config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "egret",
    about = "Session orchestration service for headless-browser automation agents",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Gateway: start the HTTP server, rotate the bearer token, inspect config.
    Gateway {
        #[command(subcommand)]
        command: GatewayCommands,
    },
    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "egret", &mut std::io::stdout());
}
