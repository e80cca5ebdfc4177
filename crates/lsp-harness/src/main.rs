//! lsp-harness — drive a language server over stdio and verify its protocol
//! behavior end to end.
//!
//! # Subcommands
//!
//! - `run`    — Run a built-in or TOML scenario against a server
//! - `config` — Show resolved configuration

use clap::Parser;

use lsp_harness::cli::{Cli, Commands};
use lsp_harness::{commands, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(&cli.config, args).await,
        Commands::Config(args) => commands::config_cmd::run(&cli.config, args).await,
    }
}
