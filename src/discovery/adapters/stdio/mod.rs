//! Subprocess transport: spawns the server and speaks JSON-RPC over its
//! standard input and output.

mod framing;

use self::framing::FrameDecoder;
use crate::discovery::{
    adapters::jsonrpc::{self, ClientInfo, Incoming},
    domain::{ServerName, ServerSpec, SubprocessSpec, TransportKind, TransportSpec},
    ports::{
        Connection, ConnectionError, McpSession, SessionError, SessionResult, TransportFactory,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

const READ_CHUNK_SIZE: usize = 8192;

/// How long a process that closed its stdout gets to report an exit status.
const EXIT_STATUS_GRACE: Duration = Duration::from_millis(250);

/// How long a process gets to exit after its stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Connects to servers by spawning them as child processes.
#[derive(Debug, Clone, Default)]
pub struct StdioTransportFactory {
    client: ClientInfo,
}

impl StdioTransportFactory {
    /// Creates a factory announcing the given client identity.
    #[must_use]
    pub const fn new(client: ClientInfo) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransportFactory for StdioTransportFactory {
    async fn connect(&self, spec: &ServerSpec) -> Result<Connection, ConnectionError> {
        let TransportSpec::Subprocess(subprocess) = spec.transport() else {
            return Err(ConnectionError::UnsupportedTransport(spec.kind()));
        };

        let mut session = StdioSession::spawn(spec.name().clone(), subprocess)?;
        if let Err(err) = session.initialize(&self.client).await {
            let failure = session.diagnose_handshake_failure(err).await;
            if let Err(shutdown_err) = session.shutdown().await {
                tracing::debug!(
                    server = %spec.name(),
                    error = %shutdown_err,
                    "failed to stop server after handshake failure"
                );
            }
            return Err(failure);
        }

        tracing::debug!(server = %spec.name(), "stdio handshake completed");
        Ok(Connection::new(
            spec.name().clone(),
            TransportKind::Subprocess,
            Box::new(session),
        ))
    }
}

/// Initialised session with a child process.
///
/// The child is spawned with `kill_on_drop`, so dropping the session
/// terminates the process even when [`McpSession::shutdown`] never ran.
pub struct StdioSession {
    server: ServerName,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    decoder: FrameDecoder,
    next_id: u64,
    stderr_drain: Option<JoinHandle<()>>,
}

impl StdioSession {
    fn spawn(server: ServerName, spec: &SubprocessSpec) -> Result<Self, ConnectionError> {
        let mut command = Command::new(spec.command());
        command
            .args(spec.args())
            .envs(spec.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(directory) = spec.working_directory() {
            command.current_dir(directory);
        }

        let spawn_error = |message: &str| ConnectionError::Spawn {
            command: spec.command().to_owned(),
            message: message.to_owned(),
        };

        let mut child = command
            .spawn()
            .map_err(|err| spawn_error(&err.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdout"))?;
        let stderr_drain = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_drain(server.clone(), stderr));

        tracing::debug!(server = %server, command = spec.command(), pid = ?child.id(), "spawned server process");

        Ok(Self {
            server,
            child,
            stdin: Some(stdin),
            stdout,
            decoder: FrameDecoder::default(),
            next_id: 1,
            stderr_drain,
        })
    }

    async fn initialize(&mut self, client: &ClientInfo) -> SessionResult<()> {
        let result = self
            .call("initialize", jsonrpc::initialize_params(client))
            .await?;
        jsonrpc::check_initialize_result(&result).map_err(SessionError::Malformed)?;
        self.send(&jsonrpc::notification("notifications/initialized"))
            .await
    }

    async fn diagnose_handshake_failure(&mut self, err: SessionError) -> ConnectionError {
        if matches!(err, SessionError::Closed | SessionError::Io(_)) {
            if let Ok(Ok(status)) = tokio::time::timeout(EXIT_STATUS_GRACE, self.child.wait()).await
            {
                return ConnectionError::ExitedBeforeHandshake {
                    status: status.to_string(),
                };
            }
        }
        ConnectionError::Handshake(err.to_string())
    }

    async fn call(&mut self, method: &str, params: Value) -> SessionResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&jsonrpc::request(id, method, params)).await?;
        self.read_response(id).await
    }

    async fn send(&mut self, message: &Value) -> SessionResult<()> {
        let mut payload = jsonrpc::encode(message)?;
        payload.push(b'\n');

        let stdin = self.stdin.as_mut().ok_or(SessionError::Closed)?;
        stdin.write_all(&payload).await.map_err(write_error)?;
        stdin.flush().await.map_err(write_error)
    }

    async fn read_response(&mut self, id: u64) -> SessionResult<Value> {
        let mut chunk = vec![0_u8; READ_CHUNK_SIZE];
        loop {
            while let Some(frame) = self.decoder.next_frame()? {
                match jsonrpc::decode(&frame) {
                    Ok(Incoming::Response {
                        id: response_id,
                        outcome,
                    }) if response_id == id => return outcome,
                    Ok(Incoming::Request {
                        id: request_id,
                        method,
                    }) => {
                        tracing::debug!(server = %self.server, %method, "answering server request");
                        self.send(&jsonrpc::reply_to(request_id, &method)).await?;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(server = %self.server, error = %err, "skipping undecodable message");
                    }
                }
            }

            let read = self
                .stdout
                .read(&mut chunk)
                .await
                .map_err(|err| SessionError::Io(err.to_string()))?;
            if read == 0 {
                return Err(SessionError::Closed);
            }
            self.decoder.push(chunk.get(..read).unwrap_or_default());
        }
    }

    fn stop_stderr_drain(&mut self) {
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
    }
}

#[async_trait]
impl McpSession for StdioSession {
    async fn request(&mut self, method: &str, params: Value) -> SessionResult<Value> {
        self.call(method, params).await
    }

    async fn shutdown(&mut self) -> SessionResult<()> {
        drop(self.stdin.take());
        self.stop_stderr_drain();

        if let Ok(waited) = tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            return waited
                .map(|status| {
                    tracing::debug!(server = %self.server, %status, "server process exited");
                })
                .map_err(|err| SessionError::Io(err.to_string()));
        }

        self.child
            .kill()
            .await
            .map_err(|err| SessionError::Io(err.to_string()))
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        self.stop_stderr_drain();
        if let Err(err) = self.child.start_kill() {
            tracing::debug!(server = %self.server, error = %err, "server process already gone");
        }
    }
}

fn write_error(err: std::io::Error) -> SessionError {
    if err.kind() == std::io::ErrorKind::BrokenPipe {
        SessionError::Closed
    } else {
        SessionError::Io(err.to_string())
    }
}

fn spawn_stderr_drain(server: ServerName, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, "server stderr: {line}");
        }
    })
}
