//! Configuration types for lsp-harness.
//!
//! [`HarnessConfig`] is deserialized from `lsp-harness.toml`. Every field has a
//! default, so an absent or partial file still yields a usable configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::framing::DEFAULT_MAX_FRAME_BYTES;
use crate::scenario::ScenarioOptions;
use crate::supervisor::{DEFAULT_DIAGNOSTIC_BUFFER_LINES, SupervisorOptions};

/// Resolved harness configuration.
///
/// # Example `lsp-harness.toml`
///
/// ```toml
/// server_bin = "./target/debug/vscript"
/// server_args = ["--lsp"]
/// receive_timeout_ms = 2000
/// grace_period_ms = 1000
/// stop_on_first_failure = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Language server executable (default: `"./vscript"`)
    #[serde(default = "default_server_bin")]
    pub server_bin: String,

    /// Arguments selecting protocol mode (default: `["--lsp"]`)
    #[serde(default = "default_server_args")]
    pub server_args: Vec<String>,

    /// Deadline for each expectation in milliseconds (default: `5000`)
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    /// Time the server gets to exit on its own before it is killed (default: `1000`)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Bound on joining the diagnostic drain at shutdown (default: `500`)
    #[serde(default = "default_drain_join_timeout_ms")]
    pub drain_join_timeout_ms: u64,

    /// Diagnostic lines kept in memory (default: `1000`)
    #[serde(default = "default_diagnostic_buffer_lines")]
    pub diagnostic_buffer_lines: usize,

    /// Largest accepted frame body in bytes (default: 64 MiB)
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Abort the scenario at the first failing step (default: `true`)
    #[serde(default = "default_stop_on_first_failure")]
    pub stop_on_first_failure: bool,
}

fn default_server_bin() -> String {
    "./vscript".to_string()
}

fn default_server_args() -> Vec<String> {
    vec!["--lsp".to_string()]
}

fn default_receive_timeout_ms() -> u64 {
    5000
}

fn default_grace_period_ms() -> u64 {
    1000
}

fn default_drain_join_timeout_ms() -> u64 {
    500
}

fn default_diagnostic_buffer_lines() -> usize {
    DEFAULT_DIAGNOSTIC_BUFFER_LINES
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_stop_on_first_failure() -> bool {
    true
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_bin: default_server_bin(),
            server_args: default_server_args(),
            receive_timeout_ms: default_receive_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
            drain_join_timeout_ms: default_drain_join_timeout_ms(),
            diagnostic_buffer_lines: default_diagnostic_buffer_lines(),
            max_frame_bytes: default_max_frame_bytes(),
            stop_on_first_failure: default_stop_on_first_failure(),
        }
    }
}

impl HarnessConfig {
    /// Driver timing and failure policy.
    pub fn scenario_options(&self) -> ScenarioOptions {
        ScenarioOptions {
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            grace_period: Duration::from_millis(self.grace_period_ms),
            stop_on_first_failure: self.stop_on_first_failure,
        }
    }

    /// Supervisor tunables.
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            diagnostic_buffer_lines: self.diagnostic_buffer_lines,
            drain_join_timeout: Duration::from_millis(self.drain_join_timeout_ms),
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}
