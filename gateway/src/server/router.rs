//! Per-connection message routing and handshake tracking
//!
//! Classifies each inbound message as a gateway-level method or an opaque
//! forward. Parse and routing errors become error responses on the same
//! connection; nothing here closes the socket.

use std::sync::Arc;

use serde_json::{json, Value};

use rpc_common::{Message, PROTOCOL_VERSION};

use crate::backend::supervisor::CALL_TIMEOUT;
use crate::backend::{BackendRegistry, RpcChannel};
use crate::error::GatewayError;

use super::{aggregate, toolcall, ServerInfo};

/// Connection handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Uninitialized,
    /// `initialize` answered, waiting for the client's confirmation.
    Initialized,
    /// `notifications/initialized` received.
    Ready,
}

pub struct Router {
    info: ServerInfo,
    registry: Arc<BackendRegistry>,
    /// In isolated-bridge mode, the connection's own backend; methods the
    /// gateway does not recognize pass through to it verbatim. In gateway
    /// mode there is no well-defined default backend, so unknown methods
    /// are rejected instead.
    passthrough: Option<Arc<dyn RpcChannel>>,
    state: HandshakeState,
    client_id: u64,
}

impl Router {
    pub fn new(
        info: ServerInfo,
        registry: Arc<BackendRegistry>,
        passthrough: Option<Arc<dyn RpcChannel>>,
        client_id: u64,
    ) -> Self {
        Self {
            info,
            registry,
            passthrough,
            state: HandshakeState::Uninitialized,
            client_id,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Handle one raw line from the client. Returns the response to write,
    /// if any; notifications never produce one.
    pub async fn handle_line(&mut self, line: &str) -> Option<Value> {
        let message: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(client = self.client_id, "Parse error: {}", e);
                return Some(GatewayError::Parse(e.to_string()).to_response(None));
            }
        };
        self.handle_message(message).await
    }

    pub async fn handle_message(&mut self, message: Value) -> Option<Value> {
        let id = message.get("id").cloned().filter(|v| !v.is_null());
        let Some(method) = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            // Responses sent by the client have nowhere to be routed.
            tracing::debug!(client = self.client_id, "Ignoring message without method");
            return None;
        };

        if self.state == HandshakeState::Uninitialized
            && method != "initialize"
            && method != "ping"
        {
            tracing::debug!(
                client = self.client_id,
                method = %method,
                "Request before initialize"
            );
        }

        match method.as_str() {
            "initialize" => Some(self.handle_initialize(id)),
            "notifications/initialized" => {
                self.state = HandshakeState::Ready;
                tracing::debug!(client = self.client_id, "Handshake complete");
                None
            }
            "ping" => Some(Message::response(id, json!({})).into_value()),
            "tools/list" => Some(aggregate::tools_list(&self.registry, id).await),
            "resources/list" => {
                Some(aggregate::merged_list(&self.registry, "resources/list", "resources", id).await)
            }
            "prompts/list" => {
                Some(aggregate::merged_list(&self.registry, "prompts/list", "prompts", id).await)
            }
            "tools/call" => Some(toolcall::dispatch(&self.registry, message, id).await),
            other => self.forward_unknown(other, message, id).await,
        }
    }

    fn handle_initialize(&mut self, id: Option<Value>) -> Value {
        self.state = HandshakeState::Initialized;
        tracing::info!(client = self.client_id, "Client initialized");
        Message::response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {},
                },
                "serverInfo": {
                    "name": self.info.name,
                    "version": self.info.version,
                },
            }),
        )
        .into_value()
    }

    async fn forward_unknown(
        &self,
        method: &str,
        message: Value,
        id: Option<Value>,
    ) -> Option<Value> {
        if let Some(backend) = &self.passthrough {
            if id.is_none() {
                if let Err(e) = backend.notify(message).await {
                    tracing::warn!(
                        client = self.client_id,
                        "Notification pass-through failed: {}",
                        e
                    );
                }
                return None;
            }
            tracing::debug!(
                client = self.client_id,
                method = %method,
                "Passing through to backend"
            );
            match backend.request(message, CALL_TIMEOUT).await {
                Ok(response) => Some(response),
                Err(e) => Some(e.to_response(id)),
            }
        } else if id.is_some() {
            tracing::debug!(client = self.client_id, method = %method, "Method not found");
            Some(GatewayError::MethodNotFound(method.to_string()).to_response(id))
        } else {
            tracing::debug!(
                client = self.client_id,
                method = %method,
                "Dropping unknown notification"
            );
            None
        }
    }
}
