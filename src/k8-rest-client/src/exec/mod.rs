//!
//! # Exec channel
//!
//! Runs a command inside a container over an upgraded connection.  An
//! HTTP/1 response body is one-directional, so the request is upgraded to
//! SPDY/3.1 and the exec subprotocol multiplexes stdin/stdout/stderr plus
//! an error channel that carries the command's final status.  The
//! WebSocket variant cannot reliably signal command termination, which is
//! why SPDY is required here.
//!
mod mux;

use std::time::Duration;

use http::HeaderMap;
use http::StatusCode;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use k8_rest_types::Status;

use crate::ClientError;
use crate::K8Request;

pub use mux::{MultiplexerConnector, MuxStream, StreamKind, StreamMultiplexer};

pub const STREAM_PROTOCOL_HEADER: &str = "X-Stream-Protocol-Version";
const SPDY_PROTOCOL: &str = "SPDY/3.1";
const REQUESTED_PROTOCOL: &str = "v4.channel.k8s.io";

/// negotiated exec subprotocol version.  v1 is rejected because it
/// cannot reliably convey the exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProtocol {
    V2,
    V3,
    V4,
}

impl StreamProtocol {
    pub fn from_response(headers: &HeaderMap) -> Result<Self, ClientError> {
        let value = headers
            .get(STREAM_PROTOCOL_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        match value {
            "v2.channel.k8s.io" => Ok(Self::V2),
            "v3.channel.k8s.io" => Ok(Self::V3),
            "v4.channel.k8s.io" => Ok(Self::V4),
            other => Err(ClientError::Upgrade {
                message: format!("unsupported stream subprotocol '{other}'"),
                status: None,
            }),
        }
    }
}

/// final result of an exec: the server's status payload plus the parsed
/// exit code (-1 when the server did not report one)
#[derive(Debug, Clone)]
pub struct ExecStatus {
    pub status: Status,
    pub code: i32,
}

impl ExecStatus {
    pub fn is_success(&self) -> bool {
        !self.status.is_failure()
    }
}

type UserReader = Box<dyn AsyncRead + Send + Unpin>;
type UserWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// exec session builder on top of a request targeting the `exec`
/// subresource
pub struct Exec {
    request: K8Request,
    stdin: Option<UserReader>,
    stdout: Option<UserWriter>,
    stderr: Option<UserWriter>,
    timeout: Option<Duration>,
    throw_on_failure: bool,
    cancel: CancellationToken,
}

impl K8Request {
    /// turn the request into an exec session against the `exec`
    /// subresource of the targeted object
    pub fn exec(self) -> Exec {
        Exec::new(self.subresource("exec"))
    }
}

impl Exec {
    pub fn new(request: K8Request) -> Self {
        Self {
            request,
            stdin: None,
            stdout: None,
            stderr: None,
            timeout: None,
            throw_on_failure: false,
            cancel: CancellationToken::new(),
        }
    }

    /// command and arguments, passed as repeated `command` parameters
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for part in command {
            self.request = self.request.query("command", part);
        }
        self
    }

    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.request = self.request.query("container", container);
        self
    }

    pub fn stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    pub fn stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    pub fn stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// raise `ExecFailed` instead of returning a failure status
    pub fn throw_on_failure(mut self, throw: bool) -> Self {
        self.throw_on_failure = throw;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// upgrade, run the command and collect its exit status
    pub async fn run(mut self) -> Result<ExecStatus, ClientError> {
        if self.request.watch_version_ref().is_some() {
            return Err(ClientError::Config(
                "a watch request cannot be executed as exec".to_owned(),
            ));
        }
        let connector = self.request.mux.clone().ok_or_else(|| {
            ClientError::Config("no multiplexer connector configured".to_owned())
        })?;

        let mut request = self
            .request
            .clone()
            .post()
            .stream_response(true)
            .accept("*/*")
            .header(http::header::CONNECTION.as_str(), "Upgrade")
            .header(http::header::UPGRADE.as_str(), SPDY_PROTOCOL)
            .header(STREAM_PROTOCOL_HEADER, REQUESTED_PROTOCOL);
        // io flags mirror the attached streams
        if self.stdin.is_some() {
            request.query.set("stdin", "true");
        }
        if self.stdout.is_some() {
            request.query.set("stdout", "true");
        }
        if self.stderr.is_some() {
            request.query.set("stderr", "true");
        }

        let mut response = request.execute().await?;
        if response.status_code() != StatusCode::SWITCHING_PROTOCOLS {
            let code = response.status_code();
            let status = response.status().await;
            return Err(ClientError::Upgrade {
                message: format!("expected 101 Switching Protocols, got {code}"),
                status: Some(status),
            });
        }

        let protocol = StreamProtocol::from_response(response.headers())?;
        debug!(?protocol, "exec upgrade negotiated");
        let io = request.transport.upgrade(response.parts_mut()).await?;
        let mux = connector.connect(io);

        let result = pump(
            &*mux,
            self.stdin.take(),
            self.stdout.take(),
            self.stderr.take(),
            &self.cancel,
            self.timeout,
        )
        .await;

        // teardown happens on every path, including cancellation
        if let Err(err) = mux.go_away().await {
            debug!("goaway failed: {err}");
        }
        if let Err(err) = mux.shutdown().await {
            debug!("multiplexer shutdown failed: {err}");
        }

        let error_buffer = result?;
        let status = extract_exit_status(protocol, &error_buffer);
        debug!(code = status.code, "exec finished");
        if self.throw_on_failure && status.status.is_failure() {
            return Err(ClientError::ExecFailed(status));
        }
        Ok(status)
    }
}

/// create the streams, gate on server acknowledgement and run the
/// copies; returns the buffered error channel payload
async fn pump(
    mux: &dyn StreamMultiplexer,
    stdin: Option<UserReader>,
    stdout: Option<UserWriter>,
    stderr: Option<UserWriter>,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, ClientError> {
    // creation order matters: error first, then stdin/stdout/stderr for
    // the streams the caller attached
    let mut error_stream = mux.open_stream(StreamKind::Error, true, false).await?;
    let stdin_stream = match stdin {
        Some(_) => Some(mux.open_stream(StreamKind::Stdin, false, true).await?),
        None => None,
    };
    let stdout_stream = match stdout {
        Some(_) => Some(mux.open_stream(StreamKind::Stdout, true, false).await?),
        None => None,
    };
    let stderr_stream = match stderr {
        Some(_) => Some(mux.open_stream(StreamKind::Stderr, true, false).await?),
        None => None,
    };
    let expected = 1
        + stdin_stream.is_some() as usize
        + stdout_stream.is_some() as usize
        + stderr_stream.is_some() as usize;

    let copies = async {
        // the server holds command start until every expected stream
        // exists; writing stdin earlier would be lost or rejected
        mux.streams_accepted(expected).await?;
        trace!(expected, "all streams acknowledged");

        let stdin_copy = async {
            if let (Some(mut user), Some(mut stream)) = (stdin, stdin_stream) {
                tokio::io::copy(&mut user, &mut stream).await?;
                // half-close signals EOF to the remote command
                stream.shutdown().await?;
            }
            Ok::<(), ClientError>(())
        };
        let stdout_copy = async {
            if let (Some(mut user), Some(mut stream)) = (stdout, stdout_stream) {
                tokio::io::copy(&mut stream, &mut user).await?;
                user.flush().await?;
            }
            Ok::<(), ClientError>(())
        };
        let stderr_copy = async {
            if let (Some(mut user), Some(mut stream)) = (stderr, stderr_stream) {
                tokio::io::copy(&mut stream, &mut user).await?;
                user.flush().await?;
            }
            Ok::<(), ClientError>(())
        };
        let error_read = async {
            let mut buffer = Vec::new();
            error_stream.read_to_end(&mut buffer).await?;
            Ok::<Vec<u8>, ClientError>(buffer)
        };

        let (_, _, _, error_buffer) =
            tokio::try_join!(stdin_copy, stdout_copy, stderr_copy, error_read)?;
        Ok::<Vec<u8>, ClientError>(error_buffer)
    };

    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => futures_util::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        _ = deadline => Err(ClientError::TimedOut),
        result = copies => result,
    }
}

/// derive the exec status from the buffered error channel
pub fn extract_exit_status(protocol: StreamProtocol, buffer: &[u8]) -> ExecStatus {
    if buffer.is_empty() {
        return ExecStatus {
            status: Status::success(),
            code: 0,
        };
    }

    match protocol {
        StreamProtocol::V4 => match serde_json::from_slice::<Status>(buffer) {
            Ok(status) => {
                let code = if status.is_failure() {
                    status
                        .find_cause("ExitCode")
                        .and_then(|cause| cause.message.as_deref())
                        .and_then(|message| message.parse().ok())
                        .unwrap_or(-1)
                } else {
                    0
                };
                ExecStatus { status, code }
            }
            Err(_) => wrap_raw(buffer),
        },
        // v2/v3 report plain text on the error channel
        StreamProtocol::V2 | StreamProtocol::V3 => wrap_raw(buffer),
    }
}

fn wrap_raw(buffer: &[u8]) -> ExecStatus {
    let text = String::from_utf8_lossy(buffer).into_owned();
    ExecStatus {
        status: Status::failure("CommandFailed", text),
        code: -1,
    }
}
