use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;

use crate::transport::UpgradedIo;
use crate::ClientError;

/// identity of an exec stream, carried in its `streamtype` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Error,
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// duplex byte channel of one multiplexed stream
pub trait MuxStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> MuxStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// boundary to the SPDY framing layer.  One session per upgraded
/// connection; streams are identified by their `streamtype` header
#[async_trait]
pub trait StreamMultiplexer: Send + Sync {
    /// open a stream tagged with the kind's `streamtype` header
    async fn open_stream(
        &self,
        kind: StreamKind,
        readable: bool,
        writable: bool,
    ) -> Result<Box<dyn MuxStream>, ClientError>;

    /// resolves once the server has acknowledged `expected` opened
    /// streams; the command does not start before that point
    async fn streams_accepted(&self, expected: usize) -> Result<(), ClientError>;

    /// send a graceful GOAWAY
    async fn go_away(&self) -> Result<(), ClientError>;

    /// tear down the session and the underlying connection
    async fn shutdown(&self) -> Result<(), ClientError>;
}

/// attaches a multiplexed session to an already-upgraded byte stream
pub trait MultiplexerConnector: Send + Sync {
    fn connect(&self, io: UpgradedIo) -> Box<dyn StreamMultiplexer>;
}
