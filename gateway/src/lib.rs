//! Gateway library
//!
//! Exposes a set of stdio tool-server backends as one line-delimited
//! JSON-RPC TCP endpoint. Backends are child processes; their tools are
//! published under `prefix:name` namespaces, catalog requests fan out
//! across every live backend, and tool calls are routed by prefix.

pub mod backend;
pub mod config;
pub mod error;
pub mod server;

pub use error::GatewayError;
