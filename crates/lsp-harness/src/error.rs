//! Transport-level error taxonomy for the process supervisor.
//!
//! Framing faults come from [`crate::framing::FrameError`] and are wrapped
//! unchanged so the raw offending bytes stay available for diagnosis.

use std::io;
use std::time::Duration;

use crate::framing::FrameError;
use crate::supervisor::LifecycleState;

/// Errors raised while driving the language server subprocess.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server executable could not be launched.
    #[error("failed to spawn language server `{program}`: {source}")]
    SpawnFailure {
        /// Program that was being launched.
        program: String,
        /// Underlying OS error.
        source: io::Error,
    },

    /// A send or receive was attempted outside the `Running` state.
    #[error("supervisor is {state}; sends and receives require a running server")]
    NotRunning {
        /// State at the time of the call.
        state: LifecycleState,
    },

    /// Writing a frame to the server's input stream failed.
    #[error("failed to write frame to server input: {0}")]
    WriteFailure(#[source] io::Error),

    /// Reading the server's output stream failed at the OS level.
    #[error("failed to read server output: {0}")]
    ReadFailure(#[source] io::Error),

    /// No complete frame arrived before the receive deadline.
    #[error("no frame received within {0:?}")]
    ReceiveTimeout(Duration),

    /// A pending receive was cancelled because the server is being torn down.
    #[error("receive aborted: the server is being terminated")]
    ReceiveAborted,

    /// The output stream carried bytes that do not form a valid frame.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl TransportError {
    /// `true` for faults that originate in message framing rather than I/O.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Frame(_))
    }
}
