//! Backend processes: supervision, channels, and the registry
//!
//! A backend is a child process speaking line-delimited JSON-RPC on its
//! stdio. [`supervisor::ProcessSupervisor`] owns exactly one such process;
//! [`registry::BackendRegistry`] owns the set configured for a gateway (or
//! the single fresh instance of an isolated-bridge connection).

pub mod channel;
pub mod registry;
pub mod supervisor;

pub use channel::RpcChannel;
pub use registry::BackendRegistry;
pub use supervisor::{BackendDescriptor, BackendState, ProcessSupervisor};
