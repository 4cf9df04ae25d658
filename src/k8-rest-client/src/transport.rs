use async_trait::async_trait;
use hyper::client::connect::Connect;
use hyper::Body;
use hyper::Client;
use hyper::Request;
use hyper::Response;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::ClientError;

/// how the response should be completed before `send` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// return as soon as headers arrive; the body streams on demand
    HeadersOnly,
    /// the caller will buffer the full body
    FullBuffer,
}

/// raw bidirectional byte stream taken over after a protocol upgrade
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type UpgradedIo = Box<dyn AsyncStream>;

/// opaque HTTP client boundary.  The request carries all headers and the
/// body; credentials have already been applied by the executor
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: Request<Body>,
        mode: CompletionMode,
    ) -> Result<Response<Body>, ClientError>;

    /// take ownership of the upgraded connection of a 101 response.
    /// `parts` are the response parts returned by `send`
    async fn upgrade(
        &self,
        parts: &mut http::response::Parts,
    ) -> Result<UpgradedIo, ClientError>;
}

/// hyper-backed transport.  Generic over the connector so the TLS stack
/// stays outside this crate
#[derive(Debug)]
pub struct HyperTransport<C> {
    client: Client<C, Body>,
}

impl<C> HyperTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn new(client: Client<C, Body>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> Transport for HyperTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn send(
        &self,
        request: Request<Body>,
        mode: CompletionMode,
    ) -> Result<Response<Body>, ClientError> {
        // hyper always completes at headers; FullBuffer is drained by the
        // response wrapper
        debug!(uri = %request.uri(), method = %request.method(), ?mode, "sending");
        self.client.request(request).await.map_err(Into::into)
    }

    async fn upgrade(
        &self,
        parts: &mut http::response::Parts,
    ) -> Result<UpgradedIo, ClientError> {
        let on_upgrade = parts
            .extensions
            .remove::<hyper::upgrade::OnUpgrade>()
            .ok_or_else(|| ClientError::Upgrade {
                message: "response is not upgradable".to_owned(),
                status: None,
            })?;
        let upgraded = on_upgrade.await?;
        Ok(Box::new(upgraded))
    }
}
