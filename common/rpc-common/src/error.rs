//! JSON-RPC error objects and reserved codes
//!
//! Provides the wire-level error type plus helper constructors for the
//! handful of codes this system actually emits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The method (or routed tool) does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Create a parse error (-32700).
pub fn parse_error() -> RpcError {
    RpcError::new(PARSE_ERROR, "Parse error")
}

/// Create a method-not-found error (-32601).
pub fn method_not_found(message: impl Into<String>) -> RpcError {
    RpcError::new(METHOD_NOT_FOUND, message)
}

/// Create an invalid-params error (-32602).
pub fn invalid_params(message: impl Into<String>) -> RpcError {
    RpcError::new(INVALID_PARAMS, message)
}

/// Create an internal error (-32603).
pub fn internal_error(message: impl Into<String>) -> RpcError {
    RpcError::new(INTERNAL_ERROR, message)
}
