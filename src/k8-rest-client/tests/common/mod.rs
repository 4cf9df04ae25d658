#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use hyper::Body;
use hyper::Request;
use hyper::Response;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;

use k8_rest_client::exec::{MultiplexerConnector, MuxStream, StreamKind, StreamMultiplexer};
use k8_rest_client::{
    ClientError, ClusterConfig, CompletionMode, K8Client, Transport, UpgradedIo,
};

pub const BASE: &str = "https://k.example/";

/// route watcher/exec traces to the test output when RUST_LOG is set
pub fn init_logs() {
    let _ = tracing_subscriber::fmt::try_init();
}

//
// scripted transport
//

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub mode: CompletionMode,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub struct CannedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CannedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: vec![],
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_owned(), "application/json".to_owned())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }
}

#[derive(Default)]
struct TransportInner {
    responses: Mutex<VecDeque<CannedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    upgrade_io: Mutex<Option<UpgradedIo>>,
}

/// transport replaying a scripted response sequence and recording every
/// outbound request.  When the script runs dry, `send` parks forever so
/// reconnect loops stay quiescent until stopped
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<TransportInner>,
}

impl MockTransport {
    pub fn script(&self, response: CannedResponse) {
        self.inner.responses.lock().unwrap().push_back(response);
    }

    pub fn set_upgrade_io(&self, io: UpgradedIo) {
        *self.inner.upgrade_io.lock().unwrap() = Some(io);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: Request<Body>,
        mode: CompletionMode,
    ) -> Result<Response<Body>, ClientError> {
        let (parts, body) = request.into_parts();
        let body = hyper::body::to_bytes(body).await?;
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    value.to_str().unwrap_or("").to_owned(),
                )
            })
            .collect();
        self.inner.requests.lock().unwrap().push(RecordedRequest {
            method: parts.method.to_string(),
            uri: parts.uri.to_string(),
            headers,
            body: body.to_vec(),
            mode,
        });

        let canned = self.inner.responses.lock().unwrap().pop_front();
        match canned {
            Some(canned) => {
                let mut builder = Response::builder().status(canned.status);
                for (name, value) in &canned.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                Ok(builder.body(Body::from(canned.body)).unwrap())
            }
            None => {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn upgrade(
        &self,
        _parts: &mut http::response::Parts,
    ) -> Result<UpgradedIo, ClientError> {
        self.inner
            .upgrade_io
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ClientError::Upgrade {
                message: "no upgrade io scripted".to_owned(),
                status: None,
            })
    }
}

pub fn client(transport: &MockTransport) -> K8Client {
    K8Client::new(
        ClusterConfig::new(BASE).expect("config"),
        transport.clone(),
    )
}

//
// scripted multiplexer
//

#[derive(Default)]
struct MuxInner {
    opened: Mutex<Vec<StreamKind>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    released: AtomicBool,
    stdin_capture: Mutex<Vec<u8>>,
    stdout_script: Mutex<Option<Vec<u8>>>,
    stderr_script: Mutex<Option<Vec<u8>>>,
    error_script: Mutex<Option<Vec<u8>>>,
    goaway_sent: AtomicBool,
    shutdown_done: AtomicBool,
}

/// multiplexer standing in for the SPDY layer: read streams replay
/// scripted payloads, the stdin stream is captured, and acknowledgement
/// can be held back behind a gate to observe ordering
#[derive(Clone, Default)]
pub struct MockMultiplexer {
    inner: Arc<MuxInner>,
}

impl MockMultiplexer {
    /// hold back stream acknowledgement until the returned sender fires
    pub fn hold_acknowledgement(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.inner.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn script_stdout(&self, payload: &[u8]) {
        *self.inner.stdout_script.lock().unwrap() = Some(payload.to_vec());
    }

    pub fn script_stderr(&self, payload: &[u8]) {
        *self.inner.stderr_script.lock().unwrap() = Some(payload.to_vec());
    }

    pub fn script_error(&self, payload: &[u8]) {
        *self.inner.error_script.lock().unwrap() = Some(payload.to_vec());
    }

    pub fn opened(&self) -> Vec<StreamKind> {
        self.inner.opened.lock().unwrap().clone()
    }

    pub fn acknowledged(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn stdin_received(&self) -> Vec<u8> {
        self.inner.stdin_capture.lock().unwrap().clone()
    }

    pub fn goaway_sent(&self) -> bool {
        self.inner.goaway_sent.load(Ordering::SeqCst)
    }

    pub fn shutdown_done(&self) -> bool {
        self.inner.shutdown_done.load(Ordering::SeqCst)
    }

    fn replay_stream(&self, payload: Vec<u8>) -> Box<dyn MuxStream> {
        let (local, mut remote) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _ = remote.write_all(&payload).await;
            // dropping the remote half signals EOF
        });
        Box::new(local)
    }
}

#[async_trait]
impl StreamMultiplexer for MockMultiplexer {
    async fn open_stream(
        &self,
        kind: StreamKind,
        _readable: bool,
        _writable: bool,
    ) -> Result<Box<dyn MuxStream>, ClientError> {
        self.inner.opened.lock().unwrap().push(kind);
        match kind {
            StreamKind::Error => {
                let payload = self
                    .inner
                    .error_script
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_default();
                Ok(self.replay_stream(payload))
            }
            StreamKind::Stdout => {
                let payload = self
                    .inner
                    .stdout_script
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_default();
                Ok(self.replay_stream(payload))
            }
            StreamKind::Stderr => {
                let payload = self
                    .inner
                    .stderr_script
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_default();
                Ok(self.replay_stream(payload))
            }
            StreamKind::Stdin => {
                let (local, mut remote) = tokio::io::duplex(4096);
                let capture = self.inner.clone();
                tokio::spawn(async move {
                    let mut chunk = [0u8; 1024];
                    loop {
                        match remote.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => capture
                                .stdin_capture
                                .lock()
                                .unwrap()
                                .extend_from_slice(&chunk[..n]),
                        }
                    }
                });
                Ok(Box::new(local))
            }
        }
    }

    async fn streams_accepted(&self, _expected: usize) -> Result<(), ClientError> {
        let gate = self.inner.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn go_away(&self) -> Result<(), ClientError> {
        self.inner.goaway_sent.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ClientError> {
        self.inner.shutdown_done.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockConnector(pub MockMultiplexer);

impl MultiplexerConnector for MockConnector {
    fn connect(&self, _io: UpgradedIo) -> Box<dyn StreamMultiplexer> {
        Box::new(self.0.clone())
    }
}

//
// shared capture writer for exec output
//

/// `AsyncWrite` into a shared buffer that stays readable after the exec
/// session consumed the writer
#[derive(Clone, Default)]
pub struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().unwrap().clone()
    }
}

impl AsyncWrite for Capture {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
