//! CLI argument types for lsp-harness.
//!
//! Defines the top-level [`Cli`] struct and all subcommand [`Args`] using
//! clap's derive macros. Each subcommand maps to a module in [`crate::commands`].

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Drive a language server over stdio and verify its protocol behavior
#[derive(Parser, Debug)]
#[command(name = "lsp-harness", version, about)]
pub struct Cli {
    /// Path to lsp-harness.toml (default: ./lsp-harness.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario against a language server
    Run(RunArgs),
    /// Show resolved configuration
    Config(ConfigArgs),
}

/// Arguments for the `run` subcommand
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Language server executable (overrides config/env)
    #[arg(long)]
    pub server: Option<String>,

    /// Argument passed to the server; repeat for several (replaces configured args)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub server_args: Vec<String>,

    /// TOML scenario file to run
    #[arg(long, conflicts_with = "builtin")]
    pub scenario: Option<PathBuf>,

    /// Built-in scenario to run when no file is given
    #[arg(long, default_value = "smoke")]
    pub builtin: String,

    /// Per-expectation receive timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Shutdown grace period in milliseconds
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Keep executing steps after a failure
    #[arg(long)]
    pub keep_going: bool,
}

/// Arguments for the `config` subcommand
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
