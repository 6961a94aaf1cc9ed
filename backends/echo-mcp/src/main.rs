//! echo-mcp - demo echo and clock tool server
//!
//! Speaks line-delimited JSON-RPC on stdio. Logs go to stderr; stdout
//! carries the protocol.

use anyhow::Result;
use chrono::Local;
use serde_json::{json, Value};
use tokio::io::BufReader;

use rpc_common::{codec, Message, PROTOCOL_VERSION};

const SERVER_NAME: &str = "echo-mcp";

fn tool_catalog() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Echo the input text back",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo"}
                },
                "required": ["text"]
            }
        },
        {
            "name": "time",
            "description": "Get the current local time",
            "inputSchema": {
                "type": "object",
                "properties": {}
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
        "echo" => {
            let Some(text) = arguments.and_then(|args| args.get("text")).and_then(Value::as_str)
            else {
                return Message::error(id, rpc_common::invalid_params("echo requires 'text'"));
            };
            text_response(id, format!("Echo: {}", text))
        }
        "time" => {
            let now = Local::now().format("%Y-%m-%d %H:%M:%S");
            text_response(id, format!("Current time: {}", now))
        }
        other => Message::error(
            id,
            rpc_common::method_not_found(format!("Unknown tool: {}", other)),
        ),
    }
}

fn text_response(id: Option<Value>, text: String) -> Message {
    Message::response(id, json!({"content": [{"type": "text", "text": text}]}))
}

#[tokio::main]
async fn main() -> Result<()> {
    rpc_common::init_tracing("echo_mcp", 1)?;
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
