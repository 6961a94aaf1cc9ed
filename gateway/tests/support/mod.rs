//! Shared helpers for integration tests
//!
//! Backends are `/bin/sh` line responders: real child processes with real
//! pipes, no build-order dependency on the demo backend binaries.

#![allow(dead_code)]

use std::collections::HashMap;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use gateway::backend::BackendDescriptor;
use rpc_common::codec;

/// Stub backend answering the full gateway-level method set. `tools/call`
/// embeds the received request under `result.echo`, so tests can assert
/// exactly what the gateway forwarded.
pub const STUB_SCRIPT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) ;;
    *initialize*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"stub","version":"0"}}}' ;;
    *tools/list*) echo '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"add","description":"Add two numbers"}]}}' ;;
    *resources/list*) echo '{"jsonrpc":"2.0","id":1,"result":{"resources":[]}}' ;;
    *prompts/list*) echo '{"jsonrpc":"2.0","id":1,"result":{"prompts":[]}}' ;;
    *tools/call*) printf '{"jsonrpc":"2.0","id":1,"result":{"echo":%s}}\n' "$line" ;;
    *ping*) echo '{"jsonrpc":"2.0","id":1,"result":{}}' ;;
    *) ;;
  esac
done
"#;

/// Stub that completes the handshake but never answers anything else.
pub const SILENT_SCRIPT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) ;;
    *initialize*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"silent","version":"0"}}}' ;;
    *) ;;
  esac
done
"#;

/// Stub that ignores the termination signal, forcing the kill path.
pub const STUBBORN_SCRIPT: &str = r#"
trap '' TERM
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) ;;
    *initialize*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"stubborn","version":"0"}}}' ;;
    *) ;;
  esac
done
"#;

/// Stub reporting an environment variable, for override-injection tests.
pub const ENV_SCRIPT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) ;;
    *initialize*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"env","version":"0"}}}' ;;
    *env/get*) printf '{"jsonrpc":"2.0","id":1,"result":{"value":"%s"}}\n' "$TEST_TOKEN" ;;
    *) ;;
  esac
done
"#;

/// Stub that records its pid to `$PIDFILE` before serving, so teardown
/// tests can check the process is really gone.
pub const PIDFILE_SCRIPT: &str = r#"
echo $$ > "$PIDFILE"
while IFS= read -r line; do
  case "$line" in
    *notifications/initialized*) ;;
    *initialize*) echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"pidfile","version":"0"}}}' ;;
    *tools/list*) echo '{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"noop","description":"noop"}]}}' ;;
    *) ;;
  esac
done
"#;

pub fn sh_descriptor(prefix: &str, name: &str, script: &str) -> BackendDescriptor {
    sh_descriptor_with_env(prefix, name, script, HashMap::new())
}

pub fn sh_descriptor_with_env(
    prefix: &str,
    name: &str,
    script: &str,
    env: HashMap<String, String>,
) -> BackendDescriptor {
    BackendDescriptor {
        id: prefix.to_string(),
        name: name.to_string(),
        prefix: prefix.to_string(),
        command: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env,
    }
}

/// Whether a process with the given pid still exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only performs the existence check.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// A line-delimited JSON-RPC client over TCP.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, message: &Value) {
        codec::write_line(&mut self.writer, message)
            .await
            .expect("write");
    }

    pub async fn send_raw(&mut self, line: &str) {
        use tokio::io::AsyncWriteExt;
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("write raw");
        self.writer.flush().await.expect("flush");
    }

    pub async fn recv(&mut self) -> Value {
        let line = codec::read_line(&mut self.reader)
            .await
            .expect("read")
            .expect("stream closed");
        serde_json::from_str(&line).expect("response JSON")
    }

    pub async fn call(&mut self, message: Value) -> Value {
        self.send(&message).await;
        self.recv().await
    }

    /// Run the client-side handshake.
    pub async fn initialize(&mut self) -> Value {
        let response = self
            .call(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {"protocolVersion": "2024-11-05", "capabilities": {}},
            }))
            .await;
        self.send(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        }))
        .await;
        response
    }
}
