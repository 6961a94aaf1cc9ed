//! JSON-RPC 2.0 message envelope
//!
//! One envelope type covers requests, notifications, and responses. The
//! gateway only deserializes into [`Message`] where it needs the typed view
//! (backend stdin loops, gateway-built replies); messages that are relayed
//! verbatim stay `serde_json::Value`, because a response carrying an
//! explicit `"result": null` would lose that field through the optional
//! `result` here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RpcError;

/// The JSON-RPC version every message carries.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision spoken on both sides of the gateway.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A JSON-RPC 2.0 message: request, notification, or response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,

    /// Present for requests and responses, absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

impl Message {
    /// Build a request with an id.
    pub fn request(id: Value, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a notification (no id, never answered).
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: None,
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a success response for the given request id.
    pub fn response(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response for the given request id.
    pub fn error(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// A request carries both a method and an id.
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// A notification carries a method but no id.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// A response carries a result or an error.
    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Assemble the message as a `serde_json::Value`.
    ///
    /// Manual assembly keeps this infallible; `id` is emitted as `null`
    /// for error responses to unidentifiable requests, per JSON-RPC.
    pub fn into_value(self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("jsonrpc".to_string(), Value::String(self.jsonrpc));
        if let Some(method) = self.method {
            map.insert("method".to_string(), Value::String(method));
            if let Some(id) = self.id {
                map.insert("id".to_string(), id);
            }
        } else {
            map.insert("id".to_string(), self.id.unwrap_or(Value::Null));
        }
        if let Some(params) = self.params {
            map.insert("params".to_string(), params);
        }
        if let Some(result) = self.result {
            map.insert("result".to_string(), result);
        }
        if let Some(error) = self.error {
            map.insert(
                "error".to_string(),
                json!({ "code": error.code, "message": error.message }),
            );
        }
        Value::Object(map)
    }
}
