//! Config resolution for lsp-harness.
//!
//! Resolves [`HarnessConfig`] from multiple sources with the following priority
//! (highest to lowest):
//!
//! 1. CLI flags (applied by the caller after [`resolve_config`] returns)
//! 2. Environment variables (`LSP_HARNESS_*`)
//! 3. An explicit `--config` file, or `lsp-harness.toml` in the working directory
//! 4. Compiled-in defaults (via [`HarnessConfig::default`])

use std::path::Path;

use anyhow::Context;

use super::types::HarnessConfig;

/// File name looked up in the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "lsp-harness.toml";

/// Resolve the configuration relative to the current working directory.
///
/// # Errors
///
/// Returns an error if the working directory cannot be determined, an explicit
/// `config_path` cannot be read, or a config file is not valid TOML.
pub fn resolve_config(config_path: Option<&Path>) -> anyhow::Result<HarnessConfig> {
    let current_dir = std::env::current_dir().context("cannot determine working directory")?;
    resolve_config_in(config_path, &current_dir)
}

/// Resolve the configuration, looking for `lsp-harness.toml` in `search_dir`
/// when `config_path` is `None`.
///
/// # Errors
///
/// See [`resolve_config`].
pub fn resolve_config_in(
    config_path: Option<&Path>,
    search_dir: &Path,
) -> anyhow::Result<HarnessConfig> {
    let mut cfg = match config_path {
        Some(path) => load_file(path)?,
        None => {
            let candidate = search_dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                load_file(&candidate)?
            } else {
                tracing::debug!("no {CONFIG_FILE_NAME} found; using defaults");
                HarnessConfig::default()
            }
        }
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn load_file(path: &Path) -> anyhow::Result<HarnessConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = toml::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(cfg)
}

/// Apply `LSP_HARNESS_*` environment variable overrides to `cfg`.
///
/// Empty values are treated as "not set". Unparseable numeric or boolean
/// values are ignored with a warning.
fn apply_env_overrides(cfg: &mut HarnessConfig) {
    if let Ok(v) = std::env::var("LSP_HARNESS_SERVER_BIN") {
        if !v.is_empty() {
            cfg.server_bin = v;
        }
    }
    if let Ok(v) = std::env::var("LSP_HARNESS_SERVER_ARGS") {
        if !v.is_empty() {
            cfg.server_args = v.split_whitespace().map(str::to_string).collect();
        }
    }
    if let Some(ms) = env_parse::<u64>("LSP_HARNESS_RECEIVE_TIMEOUT_MS") {
        cfg.receive_timeout_ms = ms;
    }
    if let Some(ms) = env_parse::<u64>("LSP_HARNESS_GRACE_PERIOD_MS") {
        cfg.grace_period_ms = ms;
    }
    if let Some(ms) = env_parse::<u64>("LSP_HARNESS_DRAIN_JOIN_TIMEOUT_MS") {
        cfg.drain_join_timeout_ms = ms;
    }
    if let Some(lines) = env_parse::<usize>("LSP_HARNESS_DIAGNOSTIC_BUFFER_LINES") {
        cfg.diagnostic_buffer_lines = lines;
    }
    if let Some(bytes) = env_parse::<usize>("LSP_HARNESS_MAX_FRAME_BYTES") {
        cfg.max_frame_bytes = bytes;
    }
    if let Ok(v) = std::env::var("LSP_HARNESS_STOP_ON_FIRST_FAILURE") {
        match v.to_ascii_lowercase().as_str() {
            "" => {}
            "1" | "true" | "yes" => cfg.stop_on_first_failure = true,
            "0" | "false" | "no" => cfg.stop_on_first_failure = false,
            other => tracing::warn!("ignoring LSP_HARNESS_STOP_ON_FIRST_FAILURE={other:?}"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok().filter(|v| !v.is_empty())?;
    match v.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring {key}={v:?}: not a valid value");
            None
        }
    }
}
