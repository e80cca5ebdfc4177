//! `config` subcommand — show resolved configuration.
//!
//! Loads the full resolved configuration and prints it either as JSON
//! (`--json`) or as a human-readable key=value table.

use crate::cli::ConfigArgs;
use crate::config::{HarnessConfig, resolve_config};
use std::path::PathBuf;

/// Run the `config` subcommand.
///
/// # Errors
///
/// Returns an error if config resolution fails (e.g., unreadable or invalid
/// TOML file).
pub async fn run(config_path: &Option<PathBuf>, args: ConfigArgs) -> anyhow::Result<()> {
    let cfg: HarnessConfig = resolve_config(config_path.as_deref())?;

    if args.json {
        let json = serde_json::to_string_pretty(&cfg)?;
        println!("{json}");
    } else {
        println!("lsp-harness configuration:");
        println!("  server_bin              = {}", cfg.server_bin);
        println!("  server_args             = {}", cfg.server_args.join(" "));
        println!("  receive_timeout_ms      = {}", cfg.receive_timeout_ms);
        println!("  grace_period_ms         = {}", cfg.grace_period_ms);
        println!("  drain_join_timeout_ms   = {}", cfg.drain_join_timeout_ms);
        println!("  diagnostic_buffer_lines = {}", cfg.diagnostic_buffer_lines);
        println!("  max_frame_bytes         = {}", cfg.max_frame_bytes);
        println!("  stop_on_first_failure   = {}", cfg.stop_on_first_failure);
    }

    Ok(())
}
