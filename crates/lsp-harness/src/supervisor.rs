//! Language server process supervisor.
//!
//! [`Supervisor`] exclusively owns one server subprocess and its three
//! streams. It:
//!
//! - Writes Content-Length frames to the server's input, flushing every frame
//! - Decodes frames from the server's output on demand, with a per-call timeout
//! - Drains the diagnostic stream on a dedicated background task for the whole
//!   life of the process, so a chatty server can never fill its pipe and stall
//! - Shuts down in bounded time: close input, request termination, wait up to a
//!   grace period, then force-kill and join the drain task
//!
//! Calls are serialized by `&mut self`. The only cross-task control surface is
//! [`AbortHandle`], which unblocks a pending [`Supervisor::receive`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::framing::{self, DEFAULT_MAX_FRAME_BYTES, FrameDecoder};
use crate::message::Message;
use crate::transport::{ServerCommand, ServerLauncher};

/// Default number of diagnostic lines retained in memory.
pub const DEFAULT_DIAGNOSTIC_BUFFER_LINES: usize = 1000;

/// Default bound on joining the diagnostic drain during shutdown.
pub const DEFAULT_DRAIN_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Read size for the output stream.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Tracing target for lines drained from the server's diagnostic stream.
pub const SERVER_LOG_TARGET: &str = "lsp_harness::server_log";

/// Lifecycle of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Spawning the process.
    Starting,
    /// Process is up; sends and receives are permitted.
    Running,
    /// Shutdown (or abort) has begun.
    Terminating,
    /// Process is gone and all streams are closed.
    Terminated,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// How a call to [`Supervisor::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The server exited on its own within the grace period.
    Graceful {
        /// Exit code, if the process exited normally rather than by signal.
        exit_code: Option<i32>,
    },
    /// The grace period elapsed (or the supervisor was aborted) and the
    /// server was killed.
    Forced,
    /// Shutdown had already completed; nothing was done.
    AlreadyTerminated,
}

impl ShutdownOutcome {
    /// `true` when the server had to be killed.
    pub fn is_forced(&self) -> bool {
        matches!(self, Self::Forced)
    }
}

impl std::fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graceful {
                exit_code: Some(code),
            } => write!(f, "graceful (exit code {code})"),
            Self::Graceful { exit_code: None } => write!(f, "graceful (terminated by signal)"),
            Self::Forced => write!(f, "forced kill after grace period"),
            Self::AlreadyTerminated => write!(f, "already terminated"),
        }
    }
}

/// Tunables for a [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Diagnostic lines kept in [`DiagnosticLog`]; older lines are evicted.
    pub diagnostic_buffer_lines: usize,
    /// Upper bound on joining the drain task after the process is gone.
    pub drain_join_timeout: Duration,
    /// Largest frame body accepted from the server.
    pub max_frame_bytes: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            diagnostic_buffer_lines: DEFAULT_DIAGNOSTIC_BUFFER_LINES,
            drain_join_timeout: DEFAULT_DRAIN_JOIN_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Bounded in-memory copy of the server's diagnostic stream.
///
/// Cloning is cheap; all clones share the same buffer.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<DiagnosticBuffer>>,
}

#[derive(Debug)]
struct DiagnosticBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    total: u64,
}

impl DiagnosticLog {
    /// An empty log retaining at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DiagnosticBuffer {
                lines: VecDeque::new(),
                capacity,
                total: 0,
            })),
        }
    }

    fn push(&self, line: String) {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.total += 1;
        if buf.capacity == 0 {
            return;
        }
        if buf.lines.len() == buf.capacity {
            buf.lines.pop_front();
        }
        buf.lines.push_back(line);
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.lines.iter().cloned().collect()
    }

    /// Total lines drained, including evicted ones.
    pub fn total_lines(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).total
    }

    /// `true` if any retained line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.lines.iter().any(|l| l.contains(needle))
    }
}

/// Cancels a pending [`Supervisor::receive`] from another task.
///
/// After [`AbortHandle::abort`] the in-flight (or next) receive fails with
/// [`TransportError::ReceiveAborted`], the supervisor moves to `Terminating`,
/// and the following [`Supervisor::shutdown`] kills the server, if it is
/// still running, without waiting out the grace period.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Request the abort. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Decodes frames from an async byte stream using [`FrameDecoder`].
///
/// Cancel-safe: dropping a pending [`OutputReader::next_message`] future loses
/// no bytes, because everything read is pushed into the decoder before the
/// next await point.
#[derive(Debug)]
pub struct OutputReader<R> {
    reader: R,
    decoder: FrameDecoder,
    eof: bool,
}

impl<R: AsyncRead + Unpin> OutputReader<R> {
    /// Wrap `reader`, rejecting frames larger than `max_frame_bytes`.
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(max_frame_bytes),
            eof: false,
        }
    }

    /// Read the next message, returning `None` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ReadFailure`] on I/O errors and
    /// [`TransportError::Frame`] on framing faults. Framing faults do not
    /// poison the reader; the next call resynchronises on the next header.
    pub async fn next_message(&mut self) -> Result<Option<Message>, TransportError> {
        let mut chunk = [0u8; READ_CHUNK_BYTES];
        loop {
            if let Some(msg) = self.decoder.next_message()? {
                return Ok(Some(msg));
            }
            if self.eof {
                self.decoder.finish()?;
                return Ok(None);
            }
            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(TransportError::ReadFailure)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.decoder.push(&chunk[..n]);
            }
        }
    }

    /// Whether the underlying stream has reached end-of-stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Encode `message` and write it to `writer` as one flushed frame.
///
/// # Errors
///
/// Returns [`TransportError::Frame`] if encoding fails and
/// [`TransportError::WriteFailure`] if the write or flush fails.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), TransportError> {
    let frame = framing::encode(message)?;
    writer
        .write_all(&frame)
        .await
        .map_err(TransportError::WriteFailure)?;
    writer.flush().await.map_err(TransportError::WriteFailure)?;
    Ok(())
}

/// Owns a running language server and its streams.
pub struct Supervisor {
    state: LifecycleState,
    program: String,
    pid: Option<u32>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    output: Option<OutputReader<ChildStdout>>,
    drain: Option<JoinHandle<()>>,
    diagnostics: DiagnosticLog,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
    options: SupervisorOptions,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state)
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("child", &"<Option<Child>>")
            .field("stdin", &"<Option<ChildStdin>>")
            .field("output", &"<Option<OutputReader<ChildStdout>>>")
            .field("drain", &self.drain.as_ref().map(|_| "<JoinHandle>"))
            .field("options", &self.options)
            .finish()
    }
}

impl Supervisor {
    /// Spawn `command` and start supervising it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SpawnFailure`] if the server cannot be started.
    pub async fn start(
        command: &ServerCommand,
        options: SupervisorOptions,
    ) -> Result<Self, TransportError> {
        Self::start_with(command, options).await
    }

    /// Start supervising a server produced by an arbitrary launcher.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SpawnFailure`] if the launcher fails.
    pub async fn start_with(
        launcher: &dyn ServerLauncher,
        options: SupervisorOptions,
    ) -> Result<Self, TransportError> {
        let program = launcher.program();
        tracing::debug!(program = %program, state = %LifecycleState::Starting, "launching language server");

        let io = launcher.launch().await.inspect_err(|e| {
            tracing::error!("{e}");
        })?;

        let pid = io.child.id();
        let diagnostics = DiagnosticLog::new(options.diagnostic_buffer_lines);
        let drain = spawn_diagnostic_drain(io.stderr, diagnostics.clone());
        let (abort_tx, abort_rx) = watch::channel(false);

        tracing::info!(program = %program, pid = ?pid, "language server running");

        Ok(Self {
            state: LifecycleState::Running,
            program,
            pid,
            child: Some(io.child),
            stdin: Some(io.stdin),
            output: Some(OutputReader::new(io.stdout, options.max_frame_bytes)),
            drain: Some(drain),
            diagnostics,
            abort_tx: Arc::new(abort_tx),
            abort_rx,
            options,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// OS process id, while the process is alive.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Shared view of the drained diagnostic stream.
    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    /// A handle that can cancel a pending receive from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: Arc::clone(&self.abort_tx),
        }
    }

    fn ensure_running(&self) -> Result<(), TransportError> {
        if self.state == LifecycleState::Running {
            Ok(())
        } else {
            Err(TransportError::NotRunning { state: self.state })
        }
    }

    /// Encode `message` and write it to the server's input, flushing at once.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotRunning`] outside the `Running` state.
    /// - [`TransportError::WriteFailure`] if the server has exited or its input
    ///   stream is closed.
    pub async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        self.ensure_running()?;

        if let Some(child) = self.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(TransportError::WriteFailure(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    format!("language server already exited ({status})"),
                )));
            }
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or(TransportError::NotRunning { state: self.state })?;
        write_frame(stdin, message).await?;
        tracing::debug!(direction = "harness->server", %message);
        Ok(())
    }

    /// Wait up to `timeout` for the next complete message from the server.
    ///
    /// Returns `Ok(None)` once the output stream reaches end-of-stream, and on
    /// every call after that. A timeout cancels only this read; the supervisor
    /// stays `Running`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::NotRunning`] outside the `Running` state.
    /// - [`TransportError::ReceiveTimeout`] when `timeout` elapses first.
    /// - [`TransportError::ReceiveAborted`] when the [`AbortHandle`] fires.
    /// - [`TransportError::Frame`] / [`TransportError::ReadFailure`] on
    ///   framing or I/O faults.
    pub async fn receive(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        self.ensure_running()?;

        let mut abort = self.abort_rx.clone();
        let output = self
            .output
            .as_mut()
            .ok_or(TransportError::NotRunning { state: self.state })?;

        let result = if *abort.borrow_and_update() {
            Err(TransportError::ReceiveAborted)
        } else {
            tokio::select! {
                biased;
                _ = abort.wait_for(|aborted| *aborted) => Err(TransportError::ReceiveAborted),
                read = tokio::time::timeout(timeout, output.next_message()) => match read {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::ReceiveTimeout(timeout)),
                },
            }
        };

        match &result {
            Ok(Some(message)) => tracing::debug!(direction = "server->harness", %message),
            Ok(None) => tracing::debug!("server output reached end of stream"),
            Err(TransportError::ReceiveAborted) => {
                tracing::warn!("receive aborted; supervisor is terminating");
                self.state = LifecycleState::Terminating;
            }
            Err(e) => tracing::warn!("receive failed: {e}"),
        }
        result
    }

    /// Stop the server in bounded time and release every stream.
    ///
    /// Closes the input stream and requests termination, waits up to
    /// `grace_period` for the process to exit, kills it if it has not, then
    /// joins the diagnostic drain. Calling this again after it has completed
    /// returns [`ShutdownOutcome::AlreadyTerminated`].
    pub async fn shutdown(&mut self, grace_period: Duration) -> ShutdownOutcome {
        if self.state == LifecycleState::Terminated {
            tracing::debug!("shutdown requested but server is already terminated");
            return ShutdownOutcome::AlreadyTerminated;
        }

        let aborted = *self.abort_rx.borrow();
        self.state = LifecycleState::Terminating;
        tracing::info!(pid = ?self.pid, ?grace_period, aborted, "shutting down language server");

        // EOF on input is the first termination request.
        drop(self.stdin.take());

        let outcome = match self.child.take() {
            Some(mut child) => {
                let exited = match child.try_wait() {
                    Ok(Some(status)) => Some(status.code()),
                    _ if aborted => None,
                    _ => wait_for_exit(&mut child, grace_period).await,
                };
                match exited {
                    Some(exit_code) => ShutdownOutcome::Graceful { exit_code },
                    None => {
                        force_kill(&mut child).await;
                        ShutdownOutcome::Forced
                    }
                }
            }
            None => ShutdownOutcome::Graceful { exit_code: None },
        };

        if outcome.is_forced() {
            tracing::warn!(
                pid = ?self.pid,
                ?grace_period,
                "language server did not exit within the grace period and was killed"
            );
        }

        drop(self.output.take());
        self.join_drain().await;

        self.abort_tx.send_replace(true);
        self.pid = None;
        self.state = LifecycleState::Terminated;
        tracing::info!(%outcome, "language server terminated");
        outcome
    }

    async fn join_drain(&mut self) {
        let Some(mut handle) = self.drain.take() else {
            return;
        };
        match tokio::time::timeout(self.options.drain_join_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("diagnostic drain task failed: {e}"),
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.options.drain_join_timeout,
                    "diagnostic stream still open after shutdown; abandoning drain"
                );
                handle.abort();
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.state != LifecycleState::Terminated {
            tracing::debug!(pid = ?self.pid, "supervisor dropped without shutdown; killing server");
        }
        if let Some(handle) = self.drain.take() {
            handle.abort();
        }
    }
}

/// Ask the process to terminate and wait up to `grace_period` for it.
///
/// Returns `Some(exit_code)` if it exited in time.
async fn wait_for_exit(child: &mut Child, grace_period: Duration) -> Option<Option<i32>> {
    request_terminate(child);
    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(Ok(status)) => Some(status.code()),
        Ok(Err(e)) => {
            tracing::warn!("failed waiting for language server exit: {e}");
            None
        }
        Err(_) => None,
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` belongs to a child we have not yet reaped, so it
        // cannot have been recycled for an unrelated process.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            tracing::debug!(pid, "SIGTERM failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) {}

async fn force_kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!("failed to kill language server: {e}");
    }
}

/// Drain the diagnostic stream line by line until it closes.
fn spawn_diagnostic_drain(stderr: ChildStderr, log: DiagnosticLog) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end_matches(['\r', '\n']).to_string();
                    tracing::info!(target: SERVER_LOG_TARGET, "{text}");
                    log.push(text);
                }
                Err(e) => {
                    tracing::warn!("diagnostic stream read failed: {e}");
                    break;
                }
            }
        }
        tracing::debug!("diagnostic stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[tokio::test]
    async fn output_reader_decodes_sequential_frames() {
        let mut input = frame(r#"{"id":1,"result":{}}"#);
        input.extend(frame(r#"{"method":"window/logMessage","params":{"message":"hi"}}"#));
        let mut reader = OutputReader::new(&input[..], DEFAULT_MAX_FRAME_BYTES);

        let first = reader.next_message().await.unwrap().unwrap();
        assert!(first.is_response_to(&json!(1)));
        let second = reader.next_message().await.unwrap().unwrap();
        assert_eq!(second.method(), Some("window/logMessage"));
        assert!(reader.next_message().await.unwrap().is_none());
        assert!(reader.is_eof());
        assert!(reader.next_message().await.unwrap().is_none(), "EOF is sticky");
    }

    #[tokio::test]
    async fn output_reader_reports_truncated_body_at_eof() {
        let input = b"Content-Length: 50\r\n\r\n{\"id\":1}".to_vec();
        let mut reader = OutputReader::new(&input[..], DEFAULT_MAX_FRAME_BYTES);
        match reader.next_message().await {
            Err(TransportError::Frame(framing::FrameError::TruncatedBody { expected, raw })) => {
                assert_eq!(expected, 50);
                assert_eq!(raw, b"{\"id\":1}");
            }
            other => panic!("expected TruncatedBody, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_reader_waits_for_split_frame() {
        let (mut server_side, client_side) = tokio::io::duplex(64);
        let mut reader = OutputReader::new(client_side, DEFAULT_MAX_FRAME_BYTES);
        let bytes = frame(r#"{"method":"split"}"#);
        let (head, tail) = bytes.split_at(10);

        server_side.write_all(head).await.unwrap();
        let pending =
            tokio::time::timeout(Duration::from_millis(50), reader.next_message()).await;
        assert!(pending.is_err(), "partial frame must not decode");

        server_side.write_all(tail).await.unwrap();
        let msg = reader.next_message().await.unwrap().unwrap();
        assert_eq!(msg.method(), Some("split"));
    }

    #[tokio::test]
    async fn write_frame_flushes_complete_frame() {
        let mut buf = Vec::new();
        let msg = Message::request(1, "initialize", json!({}));
        write_frame(&mut buf, &msg).await.unwrap();
        assert_eq!(buf, framing::encode(&msg).unwrap());
    }

    #[test]
    fn diagnostic_log_evicts_oldest() {
        let log = DiagnosticLog::new(2);
        log.push("one".to_string());
        log.push("two".to_string());
        log.push("three".to_string());
        assert_eq!(log.lines(), vec!["two", "three"]);
        assert_eq!(log.total_lines(), 3);
        assert!(log.contains("thr"));
        assert!(!log.contains("one"));
    }

    #[test]
    fn diagnostic_log_zero_capacity_only_counts() {
        let log = DiagnosticLog::new(0);
        log.push("dropped".to_string());
        assert!(log.lines().is_empty());
        assert_eq!(log.total_lines(), 1);
    }

    #[test]
    fn shutdown_outcome_display() {
        assert_eq!(
            ShutdownOutcome::Graceful { exit_code: Some(0) }.to_string(),
            "graceful (exit code 0)"
        );
        assert!(ShutdownOutcome::Forced.is_forced());
        assert!(!ShutdownOutcome::AlreadyTerminated.is_forced());
    }

    #[test]
    fn lifecycle_state_display() {
        assert_eq!(LifecycleState::Running.to_string(), "running");
        assert_eq!(LifecycleState::Terminated.to_string(), "terminated");
    }
}
