//! `run` subcommand — execute a scenario against a language server.
//!
//! Resolves configuration, applies CLI overrides, launches the server through
//! [`crate::scenario::ScenarioRunner`], and prints the report to stdout.

use std::path::PathBuf;

use anyhow::Context;

use crate::cli::RunArgs;
use crate::config::{HarnessConfig, resolve_config};
use crate::scenario::{Scenario, ScenarioRunner, builtin, file};
use crate::transport::ServerCommand;

/// Run the `run` subcommand.
///
/// # Errors
///
/// Returns an error if configuration or the scenario cannot be loaded, the
/// server cannot be spawned, or any scenario step fails.
pub async fn run(config_path: &Option<PathBuf>, args: RunArgs) -> anyhow::Result<()> {
    let mut config = resolve_config(config_path.as_deref())?;
    apply_overrides(&mut config, &args);

    let scenario = select_scenario(&args)?;
    let command = ServerCommand::from_config(&config);
    let runner = ScenarioRunner::new(config.scenario_options(), config.supervisor_options());

    let report = runner
        .run(&command, &scenario)
        .await
        .with_context(|| format!("scenario `{}` could not start", scenario.name()))?;

    print!("{report}");

    if !report.passed() {
        let failed = report.failures().count();
        anyhow::bail!("scenario `{}` failed: {failed} step(s) did not pass", report.name);
    }
    Ok(())
}

fn apply_overrides(config: &mut HarnessConfig, args: &RunArgs) {
    if let Some(ref server) = args.server {
        config.server_bin = server.clone();
    }
    if !args.server_args.is_empty() {
        config.server_args = args.server_args.clone();
    }
    if let Some(ms) = args.timeout_ms {
        config.receive_timeout_ms = ms;
    }
    if let Some(ms) = args.grace_ms {
        config.grace_period_ms = ms;
    }
    if args.keep_going {
        config.stop_on_first_failure = false;
    }
}

fn select_scenario(args: &RunArgs) -> anyhow::Result<Scenario> {
    if let Some(ref path) = args.scenario {
        return file::load_scenario(path);
    }
    builtin::by_name(&args.builtin).with_context(|| {
        format!(
            "unknown built-in scenario `{}` (available: {})",
            args.builtin,
            builtin::BUILTIN_NAMES.join(", ")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            server: None,
            server_args: Vec::new(),
            scenario: None,
            builtin: "smoke".to_string(),
            timeout_ms: None,
            grace_ms: None,
            keep_going: false,
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = HarnessConfig::default();
        let args = RunArgs {
            server: Some("/bin/ls-server".to_string()),
            server_args: vec!["--stdio".to_string()],
            timeout_ms: Some(42),
            grace_ms: Some(7),
            keep_going: true,
            ..args()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.server_bin, "/bin/ls-server");
        assert_eq!(config.server_args, vec!["--stdio"]);
        assert_eq!(config.receive_timeout_ms, 42);
        assert_eq!(config.grace_period_ms, 7);
        assert!(!config.stop_on_first_failure);
    }

    #[test]
    fn empty_overrides_keep_config() {
        let mut config = HarnessConfig::default();
        apply_overrides(&mut config, &args());
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn unknown_builtin_lists_available() {
        let err = select_scenario(&RunArgs {
            builtin: "missing".to_string(),
            ..args()
        })
        .unwrap_err();
        assert!(err.to_string().contains("smoke"));
    }
}
