//! Scenarios that ship with the harness.

use serde_json::{Value, json};

use super::{Expectation, Scenario};
use crate::message::Message;

/// URI of the document opened by [`smoke`].
pub const SMOKE_DOCUMENT_URI: &str = "file:///test.vs";

/// Source text of the document opened by [`smoke`]; the initializer is missing.
pub const SMOKE_DOCUMENT_TEXT: &str = "var x = ;";

/// Names accepted by [`by_name`].
pub const BUILTIN_NAMES: &[&str] = &["smoke", "initialize"];

/// Look up a built-in scenario.
pub fn by_name(name: &str) -> Option<Scenario> {
    match name {
        "smoke" => Some(smoke()),
        "initialize" => Some(initialize()),
        _ => None,
    }
}

/// `initialize` request answered by a correlated response.
pub fn initialize() -> Scenario {
    Scenario::new("initialize")
        .send(Message::request(1, "initialize", json!({})))
        .expect(Expectation::response_to(1))
}

/// Initialize, open a document with a syntax error, and expect diagnostics
/// for that document.
pub fn smoke() -> Scenario {
    let open = Message::notification(
        "textDocument/didOpen",
        json!({
            "textDocument": {
                "uri": SMOKE_DOCUMENT_URI,
                "text": SMOKE_DOCUMENT_TEXT,
            }
        }),
    );

    let diagnostics = Expectation::notification("textDocument/publishDiagnostics").and(
        Expectation::matching(
            format!("at least one diagnostic for {SMOKE_DOCUMENT_URI}"),
            |m| references_document(m, SMOKE_DOCUMENT_URI),
        ),
    );

    Scenario::new("smoke")
        .send(Message::request(1, "initialize", json!({})))
        .expect(Expectation::response_to(1))
        .send(open)
        .expect(diagnostics)
}

fn references_document(message: &Message, uri: &str) -> bool {
    let Some(params) = message.params.as_ref() else {
        return false;
    };
    let same_uri = params.get("uri").and_then(Value::as_str) == Some(uri);
    let has_entries = params
        .get("diagnostics")
        .and_then(Value::as_array)
        .is_some_and(|d| !d.is_empty());
    same_uri && has_entries
}
