//! Backend process supervision
//!
//! Owns one child tool-server process: spawn with environment overrides,
//! line-framed I/O over its stdio, and terminate-then-kill shutdown. The
//! child's stdout is drained by a dedicated reader task so a stalled
//! backend can never block a connection's accept or socket loop; stderr is
//! drained separately to avoid pipe-buffer deadlock.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};

use rpc_common::{codec, Message, PROTOCOL_VERSION};

use crate::config::BackendConfig;
use crate::error::GatewayError;

/// Time allowed for spawn plus handshake before a backend counts as failed.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for a forwarded tools/call response.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Short per-backend timeout for catalog queries during aggregation.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period between the termination signal and a force kill.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Liveness of a supervised backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    /// Spawned, handshake not yet complete.
    Starting,
    /// Handshake done, serving requests.
    Running,
    /// Stopped deliberately.
    Exited,
    /// Failed to start, crashed, or its channel was poisoned.
    Failed,
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendState::Starting => write!(f, "starting"),
            BackendState::Running => write!(f, "running"),
            BackendState::Exited => write!(f, "exited"),
            BackendState::Failed => write!(f, "failed"),
        }
    }
}

/// Identity and launch recipe for one backend.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub id: String,
    /// Display name, used to annotate aggregated tool descriptions.
    pub name: String,
    /// Namespace prefix, unique across the registry.
    pub prefix: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl BackendDescriptor {
    /// Build a descriptor from a config entry; name and prefix default to
    /// the backend id.
    pub fn from_config(id: &str, config: &BackendConfig) -> Self {
        Self {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            prefix: config.prefix.clone().unwrap_or_else(|| id.to_string()),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }
}

/// The serialized half of the channel: writes interleave with reads under
/// one lock, which is what enforces one-request-in-flight per backend.
struct ChannelIo {
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
}

/// Supervises one backend child process.
pub struct ProcessSupervisor {
    descriptor: BackendDescriptor,
    state: StdMutex<BackendState>,
    io: Mutex<Option<ChannelIo>>,
    child: Mutex<Option<Child>>,
    next_id: AtomicI64,
}

impl ProcessSupervisor {
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            state: StdMutex::new(BackendState::Starting),
            io: Mutex::new(None),
            child: Mutex::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> BackendState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: BackendState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Process id of the running child, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    /// Spawn the backend process and complete the protocol handshake.
    ///
    /// The host environment is inherited and merged with the descriptor's
    /// overrides; override values may reference host variables and are
    /// expanded per descriptor, so an injected key never leaks into
    /// another backend's process.
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.set_state(BackendState::Starting);
        tracing::info!(
            backend = %self.descriptor.id,
            command = %self.descriptor.command,
            "Starting backend"
        );

        let mut cmd = Command::new(&self.descriptor.command);
        if !self.descriptor.args.is_empty() {
            cmd.args(&self.descriptor.args);
        }
        for (key, value) in &self.descriptor.env {
            let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
            cmd.env(key, expanded.as_ref());
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            self.set_state(BackendState::Failed);
            GatewayError::unavailable(&self.descriptor.id, format!("spawn failed: {}", e))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            self.set_state(BackendState::Failed);
            GatewayError::unavailable(&self.descriptor.id, "child stdin not captured")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            self.set_state(BackendState::Failed);
            GatewayError::unavailable(&self.descriptor.id, "child stdout not captured")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            self.set_state(BackendState::Failed);
            GatewayError::unavailable(&self.descriptor.id, "child stderr not captured")
        })?;

        // Stderr is not part of the protocol; drain it into the log so the
        // child can never block on a full pipe.
        let backend_id = self.descriptor.id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(backend = %backend_id, "stderr: {}", line);
            }
        });

        // Dedicated reader: the only place that blocks on the child's
        // stdout. Completed lines are handed back over the channel.
        let (tx, rx) = mpsc::channel::<String>(64);
        let backend_id = self.descriptor.id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(backend = %backend_id, "Output stream closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(backend = %backend_id, "Read error: {}", e);
                        break;
                    }
                }
            }
        });

        *self.io.lock().await = Some(ChannelIo { stdin, lines: rx });
        *self.child.lock().await = Some(child);

        if let Err(e) = self.handshake().await {
            self.set_state(BackendState::Failed);
            self.kill_now().await;
            return Err(e);
        }

        self.set_state(BackendState::Running);
        tracing::info!(backend = %self.descriptor.id, "Backend started");
        Ok(())
    }

    /// Initialize the backend: `initialize` request, then the
    /// `notifications/initialized` notification.
    async fn handshake(&self) -> Result<(), GatewayError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "gateway",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let request = Message::request(json!(0), "initialize", Some(params)).into_value();
        let response = self.request(request, STARTUP_TIMEOUT).await?;
        if let Some(error) = response.get("error") {
            return Err(GatewayError::unavailable(
                &self.descriptor.id,
                format!("initialize rejected: {}", error),
            ));
        }
        self.notify(Message::notification("notifications/initialized", None).into_value())
            .await
    }

    /// Send one request and read its response.
    ///
    /// The send+receive pair holds the channel lock for its whole duration:
    /// exactly one request is in flight per backend, and concurrent callers
    /// queue FIFO. The outbound id is rewritten to an internal one and the
    /// response id is restored to the caller's, so a backend that echoes
    /// ids unfaithfully still correlates correctly under the one-in-flight
    /// contract.
    pub async fn request(&self, mut message: Value, limit: Duration) -> Result<Value, GatewayError> {
        match self.state() {
            BackendState::Running | BackendState::Starting => {}
            state => {
                return Err(GatewayError::unavailable(
                    &self.descriptor.id,
                    format!("process is {}", state),
                ));
            }
        }

        let caller_id = message.get("id").cloned();
        let internal_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match message.as_object_mut() {
            Some(map) => {
                map.insert("id".to_string(), json!(internal_id));
            }
            None => {
                return Err(GatewayError::Internal(
                    "request must be a JSON object".to_string(),
                ));
            }
        }

        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or_else(|| {
            GatewayError::unavailable(&self.descriptor.id, "process not started")
        })?;

        if let Err(e) = write_message(&mut io.stdin, &message, &self.descriptor.id).await {
            self.set_state(BackendState::Failed);
            return Err(e);
        }

        let received = tokio::time::timeout(
            limit,
            next_response(&mut io.lines, &self.descriptor.id, internal_id),
        )
        .await;

        match received {
            Ok(Ok(mut response)) => {
                if let (Some(map), Some(id)) = (response.as_object_mut(), caller_id) {
                    map.insert("id".to_string(), id);
                }
                Ok(response)
            }
            Ok(Err(e)) => {
                self.set_state(BackendState::Failed);
                Err(e)
            }
            Err(_) => {
                // The next line on the pipe may belong to this request, so
                // the channel can no longer be correlated. Poison it.
                self.set_state(BackendState::Failed);
                tracing::warn!(
                    backend = %self.descriptor.id,
                    "No response within {:?}, marking backend failed",
                    limit
                );
                Err(GatewayError::BackendTimeout {
                    backend: self.descriptor.id.clone(),
                    limit,
                })
            }
        }
    }

    /// Deliver a notification; no response is read.
    pub async fn notify(&self, message: Value) -> Result<(), GatewayError> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or_else(|| {
            GatewayError::unavailable(&self.descriptor.id, "process not started")
        })?;
        write_message(&mut io.stdin, &message, &self.descriptor.id).await
    }

    /// Terminate the backend: termination signal, bounded grace wait, then
    /// force kill. Calling stop twice is a no-op.
    pub async fn stop(&self, grace: Duration) -> Result<(), GatewayError> {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };
        tracing::info!(backend = %self.descriptor.id, "Stopping backend");

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SAFETY: plain signal delivery to the child's pid.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(backend = %self.descriptor.id, "Backend exited: {}", status);
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %self.descriptor.id, "Wait error: {}", e);
            }
            Err(_) => {
                tracing::warn!(
                    backend = %self.descriptor.id,
                    "No exit within {:?}, force killing",
                    grace
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!(backend = %self.descriptor.id, "Kill error: {}", e);
                }
            }
        }

        self.set_state(BackendState::Exited);
        Ok(())
    }

    /// Immediate kill without grace, for failed startups.
    async fn kill_now(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(backend = %self.descriptor.id, "Kill error: {}", e);
            }
        }
    }
}

async fn write_message(
    stdin: &mut ChildStdin,
    message: &Value,
    backend: &str,
) -> Result<(), GatewayError> {
    codec::write_line(stdin, message)
        .await
        .map_err(|e| GatewayError::unavailable(backend, format!("write failed: {}", e)))
}

/// Read lines until a response arrives. Notifications and malformed lines
/// are logged and skipped; they must not tear down the channel.
async fn next_response(
    lines: &mut mpsc::Receiver<String>,
    backend: &str,
    expected_id: i64,
) -> Result<Value, GatewayError> {
    loop {
        let Some(line) = lines.recv().await else {
            return Err(GatewayError::unavailable(backend, "output stream closed"));
        };
        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(backend = %backend, "Skipping malformed line: {}", e);
                continue;
            }
        };
        if value.get("result").is_some() || value.get("error").is_some() {
            if value.get("id") != Some(&json!(expected_id)) {
                tracing::debug!(
                    backend = %backend,
                    "Response id differs from sent id, accepting by arrival order"
                );
            }
            return Ok(value);
        }
        if let Some(method) = value.get("method").and_then(Value::as_str) {
            tracing::debug!(backend = %backend, "Dropping backend notification: {}", method);
        } else {
            tracing::debug!(backend = %backend, "Dropping unclassifiable line");
        }
    }
}
