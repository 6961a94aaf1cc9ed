//! Namespaced tool-call routing
//!
//! Resolves `prefix:name` to the owning backend, rewrites the request to
//! the backend's local tool name, forwards it, and relays the raw response
//! with the client's request id.

use serde_json::{json, Value};

use crate::backend::supervisor::CALL_TIMEOUT;
use crate::backend::BackendRegistry;
use crate::error::GatewayError;

/// Split a namespaced tool name on the first separator.
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(':')
}

/// Route one `tools/call` request. Always returns a response value; every
/// failure mode maps to an error response carrying the client's id.
pub async fn dispatch(
    registry: &BackendRegistry,
    mut message: Value,
    id: Option<Value>,
) -> Value {
    let Some(name) = message
        .pointer("/params/name")
        .and_then(Value::as_str)
        .map(str::to_owned)
    else {
        return GatewayError::InvalidParams("tools/call requires params.name".to_string())
            .to_response(id);
    };

    let Some((prefix, local)) = split_tool_name(&name) else {
        return GatewayError::InvalidParams(format!(
            "tool name '{}' has no namespace prefix",
            name
        ))
        .to_response(id);
    };

    let Some(backend) = registry.by_prefix(prefix) else {
        return GatewayError::UnknownPrefix(prefix.to_string()).to_response(id);
    };

    if let Some(params) = message
        .pointer_mut("/params")
        .and_then(Value::as_object_mut)
    {
        params.insert("name".to_string(), json!(local));
    }

    tracing::info!(tool = %name, backend = %prefix, "Routing tool call");
    match backend.request(message, CALL_TIMEOUT).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(backend = %prefix, "Tool call failed: {}", e);
            e.to_response(id)
        }
    }
}
