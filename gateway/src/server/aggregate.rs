//! Catalog aggregation
//!
//! Fan-out/fan-in for listing-style requests: query every live backend,
//! namespace tool names, merge. A backend that times out, has exited, or
//! answers with garbage is skipped and logged; partial results are the
//! contract, an aggregation never fails as a whole.

use serde_json::{json, Value};

use rpc_common::Message;

use crate::backend::supervisor::LIST_TIMEOUT;
use crate::backend::{BackendRegistry, RpcChannel};

/// Answer `tools/list`: the union of every live backend's tools, names
/// rewritten to `prefix:localName`, descriptions annotated with the owning
/// backend's display name.
pub async fn tools_list(registry: &BackendRegistry, id: Option<Value>) -> Value {
    let tools = collect_namespaced_tools(registry).await;
    tracing::info!("Aggregated {} tools across backends", tools.len());
    Message::response(id, json!({ "tools": tools })).into_value()
}

/// The namespaced union of all live backends' tools. Shared by the
/// tools/list handler and the `tools` diagnostic command.
pub async fn collect_namespaced_tools(registry: &BackendRegistry) -> Vec<Value> {
    let mut merged = Vec::new();
    for backend in registry.running() {
        let descriptor = backend.descriptor();
        let prefix = descriptor.prefix.clone();
        let display = descriptor.name.clone();
        match fetch_list(backend.as_ref(), "tools/list", "tools").await {
            Ok(tools) => {
                tracing::info!(backend = %prefix, "Merged {} tools", tools.len());
                merged.extend(
                    tools
                        .into_iter()
                        .map(|tool| namespace_tool(tool, &prefix, &display)),
                );
            }
            Err(reason) => {
                tracing::warn!(backend = %prefix, "Skipping backend in aggregation: {}", reason);
            }
        }
    }
    merged
}

/// Generic fan-out/merge for `resources/list` and `prompts/list`. Entries
/// merge verbatim: the namespacing contract covers tool names only.
pub async fn merged_list(
    registry: &BackendRegistry,
    method: &str,
    key: &str,
    id: Option<Value>,
) -> Value {
    let mut merged = Vec::new();
    for backend in registry.running() {
        match fetch_list(backend.as_ref(), method, key).await {
            Ok(items) => merged.extend(items),
            Err(reason) => {
                tracing::warn!(
                    backend = %backend.descriptor().prefix,
                    "Skipping backend in aggregation: {}",
                    reason
                );
            }
        }
    }
    Message::response(id, json!({ key: merged })).into_value()
}

async fn fetch_list(
    backend: &dyn RpcChannel,
    method: &str,
    key: &str,
) -> Result<Vec<Value>, String> {
    let request = Message::request(json!(0), method, None).into_value();
    let response = backend
        .request(request, LIST_TIMEOUT)
        .await
        .map_err(|e| e.to_string())?;
    if let Some(error) = response.get("error") {
        return Err(format!("backend error: {}", error));
    }
    response
        .get("result")
        .and_then(|result| result.get(key))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| format!("malformed {} response", method))
}

fn namespace_tool(mut tool: Value, prefix: &str, display: &str) -> Value {
    if let Some(map) = tool.as_object_mut() {
        let namespaced = map
            .get("name")
            .and_then(Value::as_str)
            .map(|name| format!("{}:{}", prefix, name));
        if let Some(name) = namespaced {
            map.insert("name".to_string(), Value::String(name));
        }
        let annotated = format!(
            "[{}] {}",
            display,
            map.get("description").and_then(Value::as_str).unwrap_or("")
        );
        map.insert("description".to_string(), Value::String(annotated));
    }
    tool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::channel::fake::FakeChannel;
    use std::sync::Arc;

    fn catalog_backend(prefix: &str, display: &str, tools: Value) -> Arc<dyn RpcChannel> {
        Arc::new(FakeChannel::new(prefix, display, move |_| {
            Ok(json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": tools.clone()}}))
        }))
    }

    #[tokio::test]
    async fn test_namespacing_and_annotation() {
        let registry = BackendRegistry::new(vec![catalog_backend(
            "calc",
            "Calculator",
            json!([{"name": "add", "description": "Add two numbers", "inputSchema": {"type": "object"}}]),
        )])
        .unwrap();

        let response = tools_list(&registry, Some(json!(11))).await;
        assert_eq!(response["id"], json!(11));
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], json!("calc:add"));
        assert_eq!(tools[0]["description"], json!("[Calculator] Add two numbers"));
        // Schemas pass through untouched.
        assert_eq!(tools[0]["inputSchema"]["type"], json!("object"));
    }

    #[tokio::test]
    async fn test_down_backend_skipped() {
        let registry = BackendRegistry::new(vec![
            catalog_backend("calc", "Calculator", json!([{"name": "add"}])),
            Arc::new(FakeChannel::failing("amap", "Amap")),
        ])
        .unwrap();

        let response = tools_list(&registry, Some(json!(1))).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], json!("calc:add"));
    }

    #[tokio::test]
    async fn test_malformed_result_skipped() {
        let registry = BackendRegistry::new(vec![
            catalog_backend("calc", "Calculator", json!([{"name": "add"}])),
            Arc::new(FakeChannel::new("bad", "Bad", |_| {
                Ok(json!({"jsonrpc": "2.0", "id": 1, "result": {"unexpected": true}}))
            })),
        ])
        .unwrap();

        let response = tools_list(&registry, None).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_registry_yields_empty_list() {
        let registry = BackendRegistry::new(vec![]).unwrap();

        let tools = tools_list(&registry, Some(json!(2))).await;
        assert_eq!(tools["result"]["tools"], json!([]));

        let resources = merged_list(&registry, "resources/list", "resources", Some(json!(3))).await;
        assert_eq!(resources["id"], json!(3));
        assert_eq!(resources["result"]["resources"], json!([]));
    }

    #[tokio::test]
    async fn test_resources_merge_verbatim() {
        let registry = BackendRegistry::new(vec![Arc::new(FakeChannel::new(
            "files",
            "Files",
            |_| {
                Ok(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {"resources": [{"uri": "file:///tmp/a", "name": "a"}]}
                }))
            },
        ))])
        .unwrap();

        let response = merged_list(&registry, "resources/list", "resources", None).await;
        let resources = response["result"]["resources"].as_array().unwrap();
        assert_eq!(resources[0]["name"], json!("a"));
        assert_eq!(resources[0]["uri"], json!("file:///tmp/a"));
    }
}
