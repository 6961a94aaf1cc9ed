//! Gateway error taxonomy
//!
//! Everything that can go wrong between a client line and a backend
//! response, with its JSON-RPC wire code. Parse and routing errors are
//! recovered on the connection; backend failures surface as error
//! responses rather than closing anything.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use rpc_common::{Message, RpcError, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed JSON on a line.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unrecognized top-level method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Tool call addressed to a prefix no backend registered.
    #[error("unknown backend prefix: {0}")]
    UnknownPrefix(String),

    /// Request parameters do not match the method's contract.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Backend process is not running or failed to start.
    #[error("backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Backend produced no response within the bound.
    #[error("backend '{backend}' timed out after {limit:?}")]
    BackendTimeout { backend: String, limit: Duration },

    /// Unexpected failure during dispatch.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn unavailable(backend: &str, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    /// The JSON-RPC code this error maps to on the wire.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse(_) => PARSE_ERROR,
            Self::MethodNotFound(_) | Self::UnknownPrefix(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::BackendUnavailable { .. } | Self::BackendTimeout { .. } | Self::Internal(_) => {
                INTERNAL_ERROR
            }
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(self.code(), self.to_string())
    }

    /// Render as an error response for the given request id.
    pub fn to_response(&self, id: Option<Value>) -> Value {
        Message::error(id, self.to_rpc_error()).into_value()
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}
