//! RPC Common - Shared wire layer for the gateway and its tool backends
//!
//! This crate provides the pieces both sides of the line-delimited JSON-RPC
//! transport need:
//!
//! - **Message**: the JSON-RPC 2.0 envelope and its builders
//! - **Errors**: reserved error codes and [`RpcError`] helper constructors
//! - **Codec**: one-JSON-value-per-line framing over tokio streams
//! - **Initialization**: [`init_tracing`] for standardized logging setup
//!
//! # Example
//!
//! ```rust,ignore
//! use rpc_common::{codec, Message};
//!
//! // In a backend's stdin loop
//! while let Some(line) = codec::read_line(&mut reader).await? {
//!     let request: Message = match serde_json::from_str(&line) {
//!         Ok(msg) => msg,
//!         Err(_) => {
//!             codec::write_line(&mut writer, &Message::error(None, rpc_common::parse_error())).await?;
//!             continue;
//!         }
//!     };
//!     // ...
//! }
//! ```

pub mod codec;
pub mod error;
pub mod init;
pub mod message;

// Re-export commonly used items at crate root
pub use error::{
    internal_error, invalid_params, method_not_found, parse_error, RpcError, INTERNAL_ERROR,
    INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use init::init_tracing;
pub use message::{Message, JSONRPC_VERSION, PROTOCOL_VERSION};
