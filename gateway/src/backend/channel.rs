//! The request/response seam over a backend
//!
//! Routing and aggregation only need "send one message, get one message";
//! this trait is that seam. [`ProcessSupervisor`] is the real
//! implementation; unit tests substitute an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;

use super::supervisor::{BackendDescriptor, BackendState, ProcessSupervisor};

#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Identity of the backend behind this channel.
    fn descriptor(&self) -> &BackendDescriptor;

    /// Current liveness.
    fn state(&self) -> BackendState;

    /// Send one request and return its response. One in flight at a time;
    /// concurrent callers are served in arrival order.
    async fn request(&self, message: Value, limit: Duration) -> Result<Value, GatewayError>;

    /// Deliver a notification; nothing is read back.
    async fn notify(&self, message: Value) -> Result<(), GatewayError>;

    /// Terminate the backend with the given grace period. Idempotent.
    async fn stop(&self, grace: Duration) -> Result<(), GatewayError>;
}

#[async_trait]
impl RpcChannel for ProcessSupervisor {
    fn descriptor(&self) -> &BackendDescriptor {
        ProcessSupervisor::descriptor(self)
    }

    fn state(&self) -> BackendState {
        ProcessSupervisor::state(self)
    }

    async fn request(&self, message: Value, limit: Duration) -> Result<Value, GatewayError> {
        ProcessSupervisor::request(self, message, limit).await
    }

    async fn notify(&self, message: Value) -> Result<(), GatewayError> {
        ProcessSupervisor::notify(self, message).await
    }

    async fn stop(&self, grace: Duration) -> Result<(), GatewayError> {
        ProcessSupervisor::stop(self, grace).await
    }
}
