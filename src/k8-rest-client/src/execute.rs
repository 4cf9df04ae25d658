use http::header::HeaderName;
use http::header::HeaderValue;
use http::header::ACCEPT;
use http::header::CONTENT_TYPE;
use hyper::Body;
use hyper::Request as HttpRequest;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::request::RequestBody;
use crate::transport::CompletionMode;
use crate::ClientError;
use crate::K8Request;
use crate::K8Response;

impl K8Request {
    fn completion_mode(&self) -> CompletionMode {
        // a watch implies streaming even when the caller did not ask
        if self.stream_response || self.watch_version.is_some() {
            CompletionMode::HeadersOnly
        } else {
            CompletionMode::FullBuffer
        }
    }

    /// render into an outbound HTTP request.  Reads only immutable
    /// snapshots, so concurrent executions never interfere
    fn to_http(&self) -> Result<HttpRequest<Body>, ClientError> {
        let uri = self.build_uri()?;
        let mut request = HttpRequest::builder()
            .method(self.method.clone())
            .uri(uri.as_str())
            .body(Body::empty())?;

        // credentials first, so providers see the request before any
        // header is finalized
        self.credentials.apply(&mut request)?;

        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_str(&self.accept)?);
        for (key, value) in self.headers.iter() {
            let name = HeaderName::from_bytes(key.as_bytes())?;
            request
                .headers_mut()
                .append(name, HeaderValue::from_str(value)?);
        }

        let content = match &self.body {
            RequestBody::None => None,
            RequestBody::Bytes(bytes) => Some(Body::from(bytes.clone())),
            RequestBody::Text(text) => Some(Body::from(text.clone().into_bytes())),
            RequestBody::Json(value) => Some(Body::from(serde_json::to_vec(value)?)),
            RequestBody::Stream(shared) => {
                let stream = shared
                    .lock()
                    .expect("body stream lock poisoned")
                    .take()
                    .ok_or_else(|| {
                        ClientError::Config("stream body already consumed".to_owned())
                    })?;
                Some(Body::wrap_stream(stream))
            }
        };
        if let Some(body) = content {
            let content_type = format!("{}; charset=UTF-8", self.media_type);
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
            *request.body_mut() = body;
        }

        Ok(request)
    }

    async fn run(&self, mode: CompletionMode) -> Result<K8Response, ClientError> {
        let request = self.to_http()?;
        debug!(uri = %request.uri(), method = %request.method(), "executing");
        let response = self.transport.send(request, mode).await?;
        debug!(status = %response.status(), "response");
        K8Response::from_http(response, mode).await
    }

    /// execute and hand back the response, errors included
    pub async fn execute(&self) -> Result<K8Response, ClientError> {
        self.run(self.completion_mode()).await
    }

    /// execute and raise on any error response other than 404
    pub async fn execute_checked(&self) -> Result<K8Response, ClientError> {
        let mut response = self.execute().await?;
        if response.is_error() && !response.is_not_found() {
            return Err(response.status_error().await.into());
        }
        Ok(response)
    }

    /// buffered execution decoding the body; 404 is reported as `None`
    pub async fn fetch<T>(&self) -> Result<Option<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let mut response = self.run(CompletionMode::FullBuffer).await?;
        if response.is_not_found() {
            debug!("not found, returning none");
            return Ok(None);
        }
        if response.is_error() {
            return Err(response.status_error().await.into());
        }
        Ok(Some(response.body_json().await?))
    }

    /// buffered execution decoding the body; 404 raises
    pub async fn fetch_required<T>(&self) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let mut response = self.run(CompletionMode::FullBuffer).await?;
        if response.is_error() {
            return Err(response.status_error().await.into());
        }
        response.body_json().await
    }

    /// check whether the targeted object exists
    pub async fn exists(&self) -> Result<bool, ClientError> {
        Ok(self.fetch::<serde_json::Value>().await?.is_some())
    }
}
