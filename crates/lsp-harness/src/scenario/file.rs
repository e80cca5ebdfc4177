//! TOML scenario files.
//!
//! ```toml
//! name = "initialize"
//!
//! [[steps]]
//! send = { method = "initialize", id = 1, params = {} }
//!
//! [[steps]]
//! expect = { response_to = 1, timeout_ms = 2000 }
//!
//! [[steps]]
//! expect = { method = "textDocument/publishDiagnostics", pointer = "/params/diagnostics/0" }
//! ```
//!
//! An `expect` table may combine any of `response_to`, `method`, `pointer`
//! (a JSON pointer that must resolve to a non-empty value) and `contains`
//! (a substring of the serialized message). All given criteria must hold.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use super::{Expectation, Scenario, Step};
use crate::message::Message;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StepSpec {
    Send(Message),
    Expect(ExpectSpec),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpectSpec {
    #[serde(default)]
    response_to: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    pointer: Option<String>,
    #[serde(default)]
    contains: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl ExpectSpec {
    fn into_expectation(self) -> Expectation {
        let mut criteria: Vec<Expectation> = Vec::new();
        if let Some(id) = self.response_to {
            criteria.push(Expectation::response_to(id));
        }
        if let Some(method) = self.method {
            criteria.push(Expectation::notification(method));
        }
        if let Some(pointer) = self.pointer {
            criteria.push(Expectation::matching(
                format!("non-empty value at `{pointer}`"),
                move |m| m.to_value().pointer(&pointer).is_some_and(is_non_empty),
            ));
        }
        if let Some(needle) = self.contains {
            criteria.push(Expectation::matching(
                format!("message containing {needle:?}"),
                move |m| m.to_string().contains(&needle),
            ));
        }

        let mut expectation = criteria
            .into_iter()
            .reduce(Expectation::and)
            .unwrap_or_else(Expectation::any);
        if let Some(ms) = self.timeout_ms {
            expectation = expectation.within(Duration::from_millis(ms));
        }
        expectation
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Parse a scenario from TOML text. `default_name` is used when the file
/// has no `name` key.
///
/// # Errors
///
/// Returns an error if the text is not a valid scenario document.
pub fn parse_scenario(text: &str, default_name: &str) -> anyhow::Result<Scenario> {
    let file: ScenarioFile = toml::from_str(text).context("invalid scenario file")?;
    let name = file.name.unwrap_or_else(|| default_name.to_string());
    let scenario = file
        .steps
        .into_iter()
        .fold(Scenario::new(name), |scenario, spec| match spec {
            StepSpec::Send(message) => scenario.step(Step::Send(message)),
            StepSpec::Expect(expect) => scenario.step(Step::Expect(expect.into_expectation())),
        });
    Ok(scenario)
}

/// Load a scenario file from disk, naming it after the file stem by default.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file {}", path.display()))?;
    let default_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenario".to_string());
    parse_scenario(&text, &default_name)
        .with_context(|| format!("failed to parse scenario file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SMOKE: &str = r#"
name = "from-file"

[[steps]]
send = { method = "initialize", id = 1, params = {} }

[[steps]]
expect = { response_to = 1, timeout_ms = 2000 }

[[steps]]
send = { method = "textDocument/didOpen", params = { textDocument = { uri = "file:///test.vs", text = "var x = ;" } } }

[[steps]]
expect = { method = "textDocument/publishDiagnostics", pointer = "/params/diagnostics" }
"#;

    #[test]
    fn parses_steps_in_order() {
        let scenario = parse_scenario(SMOKE, "unused").unwrap();
        assert_eq!(scenario.name(), "from-file");
        assert_eq!(scenario.steps().len(), 4);

        match &scenario.steps()[0] {
            Step::Send(msg) => {
                assert_eq!(msg.method(), Some("initialize"));
                assert_eq!(msg.id, Some(json!(1)));
                assert_eq!(msg.params, Some(json!({})));
            }
            other => panic!("expected send, got {other:?}"),
        }
        match &scenario.steps()[1] {
            Step::Expect(exp) => {
                assert_eq!(exp.timeout(), Some(Duration::from_millis(2000)));
                assert!(exp.check(&Message {
                    id: Some(json!(1)),
                    result: Some(json!({})),
                    ..Default::default()
                }));
            }
            other => panic!("expected expect, got {other:?}"),
        }
    }

    #[test]
    fn pointer_requires_non_empty_value() {
        let scenario = parse_scenario(SMOKE, "unused").unwrap();
        let Step::Expect(exp) = &scenario.steps()[3] else {
            panic!("expected expect step");
        };
        let empty = Message::notification(
            "textDocument/publishDiagnostics",
            json!({"uri": "file:///test.vs", "diagnostics": []}),
        );
        let full = Message::notification(
            "textDocument/publishDiagnostics",
            json!({"uri": "file:///test.vs", "diagnostics": [{"message": "boom"}]}),
        );
        assert!(!exp.check(&empty));
        assert!(exp.check(&full));
    }

    #[test]
    fn contains_and_default_name() {
        let text = r#"
[[steps]]
expect = { contains = "Expected expression" }
"#;
        let scenario = parse_scenario(text, "fallback").unwrap();
        assert_eq!(scenario.name(), "fallback");
        let Step::Expect(exp) = &scenario.steps()[0] else {
            panic!("expected expect step");
        };
        assert!(exp.check(&Message::notification(
            "x",
            json!({"message": "Expected expression after '='"})
        )));
    }

    #[test]
    fn unknown_expect_key_is_rejected() {
        let text = r#"
[[steps]]
expect = { respons_to = 1 }
"#;
        assert!(parse_scenario(text, "bad").is_err());
    }

    #[test]
    fn load_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open-file.toml");
        std::fs::write(&path, "[[steps]]\nexpect = {}\n").unwrap();
        let scenario = load_scenario(&path).unwrap();
        assert_eq!(scenario.name(), "open-file");
        let Step::Expect(exp) = &scenario.steps()[0] else {
            panic!("expected expect step");
        };
        assert_eq!(exp.description(), "any message");
    }
}
