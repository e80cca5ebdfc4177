//! Launching the language server subprocess.
//!
//! [`ServerLauncher`] is the trait seam between [`crate::supervisor::Supervisor`]
//! and whatever actually starts the server. The shipping implementation is
//! [`ServerCommand`], which spawns an executable with its input, output and
//! diagnostic streams connected as pipes.
//!
//! The launcher only creates the process and hands back raw handles. Framing,
//! the diagnostic drain task and shutdown all stay in the supervisor, which
//! owns the returned [`ServerIo`] for the rest of the process's life.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::config::HarnessConfig;
use crate::error::TransportError;

/// Raw handles produced by a successful [`ServerLauncher::launch`].
pub struct ServerIo {
    /// The process itself, retained for waiting and force-kill.
    pub child: Child,
    /// Protocol input stream.
    pub stdin: ChildStdin,
    /// Protocol output stream.
    pub stdout: ChildStdout,
    /// Unstructured diagnostic stream.
    pub stderr: ChildStderr,
}

impl std::fmt::Debug for ServerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIo")
            .field("pid", &self.child.id())
            .field("stdin", &"<ChildStdin>")
            .field("stdout", &"<ChildStdout>")
            .field("stderr", &"<ChildStderr>")
            .finish()
    }
}

/// Starts a language server and returns its piped streams.
///
/// Object-safe via [`async_trait`] so callers can hold a `&dyn ServerLauncher`.
///
/// # Errors
///
/// `launch` returns [`TransportError::SpawnFailure`] if the process cannot be
/// started or any of its streams is not piped.
#[async_trait]
pub trait ServerLauncher: Send + Sync + std::fmt::Debug {
    /// Human-readable name of the program being launched, for logs and errors.
    fn program(&self) -> String;

    /// Spawn the server.
    async fn launch(&self) -> Result<ServerIo, TransportError>;
}

/// An executable plus the arguments, environment and working directory to
/// launch it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl ServerCommand {
    /// A command with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Build the command described by `server_bin` / `server_args`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.server_bin).args(config.server_args.iter().cloned())
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the server.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the server from `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Arguments passed to the server.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn spawn_failure(&self, source: std::io::Error) -> TransportError {
        TransportError::SpawnFailure {
            program: self.program(),
            source,
        }
    }
}

#[async_trait]
impl ServerLauncher for ServerCommand {
    fn program(&self) -> String {
        self.program.display().to_string()
    }

    async fn launch(&self) -> Result<ServerIo, TransportError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| self.spawn_failure(e))?;

        let not_piped = |stream: &str| {
            std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("server {stream} was not piped"),
            )
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.spawn_failure(not_piped("stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.spawn_failure(not_piped("stdout")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.spawn_failure(not_piped("stderr")))?;

        tracing::debug!(
            program = %self.program(),
            args = ?self.args,
            pid = ?child.id(),
            "spawned language server"
        );

        Ok(ServerIo {
            child,
            stdin,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_uses_bin_and_args() {
        let config = HarnessConfig {
            server_bin: "/opt/vscript".to_string(),
            server_args: vec!["--lsp".to_string(), "--verbose".to_string()],
            ..Default::default()
        };
        let cmd = ServerCommand::from_config(&config);
        assert_eq!(cmd.program(), "/opt/vscript");
        assert_eq!(cmd.get_args(), ["--lsp", "--verbose"]);
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_failure() {
        let cmd = ServerCommand::new("/definitely/not/a/real/language-server").arg("--lsp");
        match cmd.launch().await {
            Err(TransportError::SpawnFailure { program, source }) => {
                assert!(program.ends_with("language-server"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected SpawnFailure, got {other:?}"),
        }
    }
}
