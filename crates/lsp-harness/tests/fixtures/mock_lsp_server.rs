//! Mock language server for integration testing.
//!
//! Reads Content-Length framed JSON from stdin and writes Content-Length framed
//! JSON to stdout. Implements just enough of a language server to exercise the
//! harness's framing, stream draining, timeouts, and shutdown escalation.
//!
//! Must be started with `--lsp`; anything else exits with code 2.
//!
//! # Supported methods
//!
//! - `initialize` — returns minimal capabilities
//! - `textDocument/didOpen` — publishes diagnostics for the opened document;
//!   text containing `= ;` yields one "expected expression" error
//! - `shutdown` — returns `null`
//! - `exit` — exits with code 0
//! - `test/crash` — exits with code 42 immediately
//!
//! # Modes (`MOCK_LSP_MODE`)
//!
//! - `normal` (default) — behaves as above
//! - `silent` — reads everything, never writes to stdout
//! - `noisy` — writes ~512 KiB to stderr before every reply
//! - `stubborn` — ignores SIGTERM and keeps running after stdin EOF
//! - `garbage` — prefixes the `initialize` reply with noise lines and answers
//!   every later request with a frame whose declared length is too short

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Silent,
    Noisy,
    Stubborn,
    Garbage,
}

fn main() {
    if !std::env::args().any(|a| a == "--lsp") {
        eprintln!("mock-lsp-server: --lsp is required");
        std::process::exit(2);
    }

    let mode = match std::env::var("MOCK_LSP_MODE").as_deref() {
        Ok("silent") => Mode::Silent,
        Ok("noisy") => Mode::Noisy,
        Ok("stubborn") => Mode::Stubborn,
        Ok("garbage") => Mode::Garbage,
        _ => Mode::Normal,
    };

    if mode == Mode::Stubborn {
        ignore_sigterm();
    }

    eprintln!("mock-lsp-server: started in {mode:?} mode");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    while let Some(msg) = read_frame(&mut reader) {
        handle_message(&msg, mode, &mut writer);
    }

    eprintln!("mock-lsp-server: stdin closed");
    if mode == Mode::Stubborn {
        loop {
            std::thread::sleep(std::time::Duration::from_secs(60));
        }
    }
}

#[cfg(unix)]
fn ignore_sigterm() {
    // SAFETY: installing SIG_IGN has no preconditions.
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigterm() {}

fn read_frame(reader: &mut impl BufRead) -> Option<Value> {
    let mut length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if length.is_some() {
                break;
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("Content-Length:") {
            length = rest.trim().parse().ok();
        }
    }
    let mut body = vec![0u8; length?];
    reader.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

fn handle_message(msg: &Value, mode: Mode, writer: &mut impl Write) {
    let method = msg.get("method").and_then(|v| v.as_str());
    let id = msg.get("id").cloned();

    eprintln!("mock-lsp-server: received {}", method.unwrap_or("<response>"));

    if method == Some("test/crash") {
        std::process::exit(42);
    }
    if method == Some("exit") {
        std::process::exit(0);
    }
    if mode == Mode::Silent {
        return;
    }
    if mode == Mode::Noisy {
        flood_stderr();
    }

    match method {
        Some("initialize") => {
            if mode == Mode::Garbage {
                writer
                    .write_all(b"mock-lsp-server warming up\r\n{\"not\":\"a frame\"}\n")
                    .expect("write noise");
            }
            let resp = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "capabilities": {
                        "textDocumentSync": 1
                    },
                    "serverInfo": {
                        "name": "mock-lsp-server",
                        "version": "0.1.0"
                    }
                }
            });
            write_msg(writer, &resp);
        }

        Some("textDocument/didOpen") => {
            let uri = msg
                .pointer("/params/textDocument/uri")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let text = msg
                .pointer("/params/textDocument/text")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let diagnostics = match text.find("= ;") {
                Some(col) => json!([{
                    "range": {
                        "start": {"line": 0, "character": col + 2},
                        "end": {"line": 0, "character": col + 3}
                    },
                    "severity": 1,
                    "source": "mock-lsp-server",
                    "message": "Expected expression after '='"
                }]),
                None => json!([]),
            };
            let notification = json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": {
                    "uri": uri,
                    "diagnostics": diagnostics
                }
            });
            write_msg(writer, &notification);
        }

        Some("shutdown") => {
            write_msg(writer, &json!({"jsonrpc": "2.0", "id": id, "result": null}));
        }

        Some(unknown) => {
            let Some(req_id) = id else {
                return;
            };
            if mode == Mode::Garbage {
                let body = serde_json::to_string(&json!({"id": req_id, "result": {}}))
                    .expect("serialize JSON");
                let frame = format!("Content-Length: {}\r\n\r\n{}", body.len() - 3, body);
                writer.write_all(frame.as_bytes()).expect("write frame");
                writer.flush().expect("flush stdout");
                return;
            }
            let resp = json!({
                "jsonrpc": "2.0",
                "id": req_id,
                "error": {
                    "code": -32601,
                    "message": format!("Method not found: {unknown}")
                }
            });
            write_msg(writer, &resp);
        }

        None => {}
    }
}

fn flood_stderr() {
    let line = "x".repeat(1023);
    let stderr = std::io::stderr();
    let mut err = stderr.lock();
    for i in 0..512 {
        let _ = writeln!(err, "noise {i:04} {line}");
    }
    let _ = err.flush();
}

fn write_msg(writer: &mut impl Write, msg: &Value) {
    let body = serde_json::to_string(msg).expect("serialize JSON");
    write!(writer, "Content-Length: {}\r\n\r\n{}", body.len(), body).expect("write to stdout");
    writer.flush().expect("flush stdout");
}
