use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use futures_util::TryStreamExt;
use http::HeaderMap;
use http::StatusCode;
use hyper::Body;
use hyper::Response;
use serde::de::DeserializeOwned;
use tracing::error;
use tracing::trace;

use k8_rest_types::Status;
use k8_rest_types::StatusValue;

use crate::error::StatusError;
use crate::transport::CompletionMode;
use crate::watch::EventStream;
use crate::watch::FrameStream;
use crate::ClientError;

#[derive(Debug)]
enum ResponseBody {
    Buffered(Bytes),
    Streaming(Option<Body>),
}

/// lazy accessor over an HTTP response.
///
/// Buffered responses need no disposal; a streaming body is taken at most
/// once and releases the connection when dropped.
#[derive(Debug)]
pub struct K8Response {
    parts: http::response::Parts,
    body: ResponseBody,
}

impl K8Response {
    pub(crate) async fn from_http(
        response: Response<Body>,
        mode: CompletionMode,
    ) -> Result<Self, ClientError> {
        let (parts, body) = response.into_parts();
        let body = match mode {
            CompletionMode::FullBuffer => {
                ResponseBody::Buffered(hyper::body::to_bytes(body).await?)
            }
            CompletionMode::HeadersOnly => ResponseBody::Streaming(Some(body)),
        };
        Ok(Self { parts, body })
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts.status
    }

    pub fn is_error(&self) -> bool {
        self.parts.status.as_u16() >= 400
    }

    pub fn is_not_found(&self) -> bool {
        self.parts.status == StatusCode::NOT_FOUND
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub(crate) fn parts_mut(&mut self) -> &mut http::response::Parts {
        &mut self.parts
    }

    /// raw body stream; only available once on a streaming response
    pub fn body_stream(&mut self) -> Result<BoxStream<'static, Result<Bytes, ClientError>>, ClientError> {
        match &mut self.body {
            ResponseBody::Streaming(body) => {
                let body = body.take().ok_or(ClientError::BodyConsumed)?;
                Ok(body.map_err(ClientError::from).boxed())
            }
            ResponseBody::Buffered(bytes) => {
                let bytes = bytes.clone();
                Ok(futures_util::stream::once(async move { Ok(bytes) }).boxed())
            }
        }
    }

    /// buffer the body if needed and return the raw bytes
    pub async fn body_bytes(&mut self) -> Result<Bytes, ClientError> {
        match &mut self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes.clone()),
            ResponseBody::Streaming(body) => {
                let body = body.take().ok_or(ClientError::BodyConsumed)?;
                let bytes = hyper::body::to_bytes(body).await?;
                self.body = ResponseBody::Buffered(bytes.clone());
                Ok(bytes)
            }
        }
    }

    /// buffer and decode the body
    pub async fn body_json<T>(&mut self) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let bytes = self.body_bytes().await?;
        trace!("decoding response: {}", String::from_utf8_lossy(&bytes));
        serde_json::from_slice(&bytes).map_err(|err| {
            error!("json error: {}", err);
            error!("source: {}", String::from_utf8_lossy(&bytes));
            err.into()
        })
    }

    /// decode a `Status` from the body, or synthesize one from the HTTP
    /// status line when the body is empty or not a status
    pub async fn status(&mut self) -> Status {
        let code = self.parts.status;
        let bytes = self.body_bytes().await.unwrap_or_default();
        if let Ok(status) = serde_json::from_slice::<Status>(&bytes) {
            if status.kind == "Status" {
                return status;
            }
        }

        Status {
            kind: "Status".to_owned(),
            api_version: "v1".to_owned(),
            status: Some(if code.as_u16() >= 400 {
                StatusValue::Failure
            } else {
                StatusValue::Success
            }),
            reason: code.canonical_reason().map(|reason| reason.to_owned()),
            message: (!bytes.is_empty())
                .then(|| String::from_utf8_lossy(&bytes).into_owned()),
            code: Some(code.as_u16()),
            details: None,
        }
    }

    pub(crate) async fn status_error(&mut self) -> StatusError {
        let code = self.status_code();
        StatusError::new(code, self.status().await)
    }

    /// turn a streaming watch response into a typed event reader
    pub fn into_events<T>(mut self) -> Result<EventStream<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let frames = FrameStream::new(self.body_stream()?);
        Ok(EventStream::new(frames))
    }
}
