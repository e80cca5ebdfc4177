//! Configuration resolution for lsp-harness.
//!
//! The entry point is [`resolve_config`], which layers an optional
//! `lsp-harness.toml` file and `LSP_HARNESS_*` environment variables over the
//! compiled-in defaults of [`HarnessConfig`].
//!
//! See [`resolve`] for the full priority chain and [`types`] for all config types.

mod resolve;
mod types;

pub use resolve::{CONFIG_FILE_NAME, resolve_config, resolve_config_in};
pub use types::HarnessConfig;
