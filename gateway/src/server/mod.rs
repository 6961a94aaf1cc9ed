//! TCP server: connection acceptance and per-connection lifecycle
//!
//! Each accepted socket gets its own task and a monotonically increasing
//! client id (logging only, never on the wire). In gateway mode every
//! connection shares one registry; in isolated-bridge mode each connection
//! spawns a fresh backend that dies with it.

pub mod aggregate;
pub mod router;
pub mod toolcall;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use rpc_common::codec;

use crate::backend::supervisor::STOP_GRACE;
use crate::backend::{BackendDescriptor, BackendRegistry, ProcessSupervisor, RpcChannel};
use crate::config::GatewaySection;

pub use router::{HandshakeState, Router};

/// Identity reported to clients in initialize responses.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn from_config(section: &GatewaySection) -> Self {
        Self {
            name: section.name.clone(),
            version: section.version.clone(),
        }
    }
}

/// How connections are associated with backends.
pub enum ServerMode {
    /// One shared registry serves every connection; backends are started
    /// at gateway startup and reused.
    Gateway(Arc<BackendRegistry>),
    /// Each connection spawns its own fresh backend from this template,
    /// torn down when the connection closes.
    Isolated(BackendDescriptor),
}

pub struct GatewayServer {
    info: ServerInfo,
    mode: ServerMode,
    next_client_id: AtomicU64,
}

impl GatewayServer {
    pub fn new(info: ServerInfo, mode: ServerMode) -> Self {
        Self {
            info,
            mode,
            next_client_id: AtomicU64::new(0),
        }
    }

    /// Accept connections until a shutdown signal arrives, then stop
    /// accepting, stop every owned backend with bounded grace, and return.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("Gateway listening on {}", addr);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed) + 1;
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                server.handle_connection(stream, peer, client_id).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        drop(listener);
        if let ServerMode::Gateway(registry) = &self.mode {
            registry.shutdown_all(STOP_GRACE).await;
        }
        tracing::info!("Gateway stopped");
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, client_id: u64) {
        tracing::info!(client = client_id, peer = %peer, "Client connected");

        let (registry, owned) = match self.connection_backends().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(client = client_id, "Failed to prepare backend: {:#}", e);
                return;
            }
        };

        let mut router = Router::new(
            self.info.clone(),
            Arc::clone(&registry),
            owned.clone(),
            client_id,
        );

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        loop {
            match codec::read_line(&mut reader).await {
                Ok(Some(line)) => {
                    if let Some(response) = router.handle_line(&line).await {
                        if let Err(e) = codec::write_line(&mut writer, &response).await {
                            tracing::warn!(client = client_id, "Write failed: {}", e);
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(client = client_id, "Read failed: {}", e);
                    break;
                }
            }
        }

        tracing::info!(client = client_id, "Client disconnected");
        if let Some(backend) = owned {
            if let Err(e) = backend.stop(STOP_GRACE).await {
                tracing::warn!(client = client_id, "Backend teardown failed: {}", e);
            }
        }
    }

    /// Resolve the backend set a new connection talks to. In isolated mode
    /// this spawns the connection's dedicated backend; the caller owns its
    /// teardown.
    async fn connection_backends(
        &self,
    ) -> Result<(Arc<BackendRegistry>, Option<Arc<dyn RpcChannel>>)> {
        match &self.mode {
            ServerMode::Gateway(registry) => Ok((Arc::clone(registry), None)),
            ServerMode::Isolated(template) => {
                let supervisor = Arc::new(ProcessSupervisor::new(template.clone()));
                supervisor
                    .start()
                    .await
                    .with_context(|| format!("failed to start backend '{}'", template.id))?;
                let channel: Arc<dyn RpcChannel> = supervisor;
                Ok((
                    Arc::new(BackendRegistry::single(Arc::clone(&channel))),
                    Some(channel),
                ))
            }
        }
    }
}
