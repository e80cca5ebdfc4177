//! The structured record carried inside every frame.
//!
//! A [`Message`] is deliberately loose: the harness only cares about the
//! structural fields needed to correlate traffic (`method`, `id`) and treats
//! `params`, `result` and `error` as opaque JSON. Any other top-level key
//! (typically `"jsonrpc"`) is kept in [`Message::extra`] so that decoding and
//! re-encoding a message never drops information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request, notification, or response exchanged with the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Method name; present on requests and notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Correlation identifier; present on requests and their responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    /// Request/notification payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Successful response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    /// Top-level keys the harness does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Build a request expecting a response correlated by `id`.
    pub fn request(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            method: Some(method.into()),
            id: Some(id.into()),
            params: Some(params),
            ..Default::default()
        }
    }

    /// Build a notification (no `id`, no response expected).
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: Some(method.into()),
            params: Some(params),
            ..Default::default()
        }
    }

    /// Method name, if any.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// `true` when this message carries no method and its `id` equals `id`.
    pub fn is_response_to(&self, id: &Value) -> bool {
        self.method.is_none() && self.id.as_ref() == Some(id)
    }

    /// `true` for a method-bearing message without an `id`.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// Render the message as a JSON value (used for reports and predicates).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unserializable message>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_only_present_fields() {
        let msg = Message::request(1, "initialize", json!({}));
        let v = msg.to_value();
        assert_eq!(v, json!({"method": "initialize", "id": 1, "params": {}}));
    }

    #[test]
    fn notification_has_no_id() {
        let msg = Message::notification("initialized", json!({}));
        assert!(msg.is_notification());
        assert!(msg.to_value().get("id").is_none());
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let raw = r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.extra.get("jsonrpc"), Some(&json!("2.0")));
        assert!(msg.is_response_to(&json!(7)));
        assert!(!msg.is_response_to(&json!(8)));
        assert_eq!(msg.to_value()["jsonrpc"], "2.0");
    }

    #[test]
    fn display_is_compact_json() {
        let msg = Message::notification("exit", json!(null));
        assert_eq!(msg.to_string(), r#"{"method":"exit","params":null}"#);
    }
}
