//! calc-mcp - demo arithmetic tool server
//!
//! Speaks line-delimited JSON-RPC on stdio: one request per line, one
//! response per line. Logs go to stderr; stdout carries the protocol.

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::BufReader;

use rpc_common::{codec, Message, PROTOCOL_VERSION};

const SERVER_NAME: &str = "calc-mcp";

fn tool_catalog() -> Value {
    json!([
        {
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "a": {"type": "number", "description": "First number"},
                    "b": {"type": "number", "description": "Second number"}
                },
                "required": ["a", "b"]
            }
        }
    ])
}

fn handle_request(request: &Message) -> Option<Message> {
    let id = request.id.clone();
    match request.method.as_deref() {
        Some("initialize") => Some(Message::response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )),
        Some("notifications/initialized") => None,
        Some("ping") => Some(Message::response(id, json!({}))),
        Some("tools/list") => Some(Message::response(id, json!({"tools": tool_catalog()}))),
        Some("tools/call") => Some(handle_tool_call(request)),
        Some(method) => {
            if id.is_none() {
                return None;
            }
            Some(Message::error(
                id,
                rpc_common::method_not_found(format!("Method not found: {}", method)),
            ))
        }
        None => None,
    }
}

fn handle_tool_call(request: &Message) -> Message {
    let id = request.id.clone();
    let params = request.params.as_ref();
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let arguments = params.and_then(|p| p.get("arguments"));

    match name {
        "add" => {
            let Some((a, b)) = arguments.and_then(|args| {
                Some((args.get("a")?.as_f64()?, args.get("b")?.as_f64()?))
            }) else {
                return Message::error(
                    id,
                    rpc_common::invalid_params("add requires numeric 'a' and 'b'"),
                );
            };
            let text = format!("{} + {} = {}", format_number(a), format_number(b), format_number(a + b));
            Message::response(
                id,
                json!({"content": [{"type": "text", "text": text}]}),
            )
        }
        other => Message::error(
            id,
            rpc_common::method_not_found(format!("Unknown tool: {}", other)),
        ),
    }
}

/// Render whole results without a trailing `.0` so `2 + 3 = 5`, not `5.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    rpc_common::init_tracing("calc_mcp", 1)?;
    tracing::info!("Starting {}", SERVER_NAME);

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = tokio::io::stdout();

    while let Some(line) = codec::read_line(&mut reader).await? {
        let request: Message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Parse error: {}", e);
                let error = Message::error(None, rpc_common::parse_error()).into_value();
                codec::write_line(&mut writer, &error).await?;
                continue;
            }
        };
        if let Some(response) = handle_request(&request) {
            codec::write_line(&mut writer, &response.into_value()).await?;
        }
    }

    tracing::info!("Input stream closed, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> Message {
        Message::request(
            json!(1),
            "tools/call",
            Some(json!({"name": name, "arguments": arguments})),
        )
    }

    #[test]
    fn test_add_formats_integers() {
        let response = handle_request(&call("add", json!({"a": 2, "b": 3}))).unwrap();
        let value = response.into_value();
        assert_eq!(value["result"]["content"][0]["text"], json!("2 + 3 = 5"));
        assert_eq!(value["id"], json!(1));
    }

    #[test]
    fn test_add_keeps_fractions() {
        let response = handle_request(&call("add", json!({"a": 1.5, "b": 2}))).unwrap();
        let value = response.into_value();
        assert_eq!(value["result"]["content"][0]["text"], json!("1.5 + 2 = 3.5"));
    }

    #[test]
    fn test_add_rejects_missing_arguments() {
        let response = handle_request(&call("add", json!({"a": 2}))).unwrap();
        let value = response.into_value();
        assert_eq!(value["error"]["code"], json!(-32602));
    }

    #[test]
    fn test_unknown_tool() {
        let response = handle_request(&call("frobnicate", json!({}))).unwrap();
        let value = response.into_value();
        assert_eq!(value["error"]["code"], json!(-32601));
    }

    #[test]
    fn test_initialize_reports_identity() {
        let request = Message::request(json!(9), "initialize", Some(json!({})));
        let value = handle_request(&request).unwrap().into_value();
        assert_eq!(value["result"]["serverInfo"]["name"], json!(SERVER_NAME));
        assert_eq!(value["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
    }

    #[test]
    fn test_initialized_notification_gets_no_reply() {
        let request = Message::notification("notifications/initialized", None);
        assert!(handle_request(&request).is_none());
    }
}
