//! lsp-harness library crate.
//!
//! Provides the Content-Length framer, the language server process
//! supervisor, the scenario driver, configuration, and CLI types for the
//! `lsp-harness` binary. Exposed as a library for integration testing and
//! for embedding scenarios in other test suites.
//!
//! Layering, leaf first: [`framing`] → [`supervisor`] (via [`transport`]) →
//! [`scenario`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod framing;
pub mod logging;
pub mod message;
pub mod scenario;
pub mod supervisor;
pub mod transport;

#[doc(inline)]
pub use error::TransportError;
#[doc(inline)]
pub use message::Message;
#[doc(inline)]
pub use supervisor::{LifecycleState, ShutdownOutcome, Supervisor, SupervisorOptions};
#[doc(inline)]
pub use transport::{ServerCommand, ServerLauncher};
