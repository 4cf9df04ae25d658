use std::marker::PhantomData;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::stream::Stream;
use serde::de::DeserializeOwned;
use tracing::error;
use tracing::trace;

use k8_rest_types::WatchEvent;

use crate::ClientError;

use super::FrameStream;

/// decodes one watch frame at a time into typed events.
/// Pull-based and bound to a single response; a malformed frame surfaces
/// a decode error, end of stream ends the sequence
pub struct EventStream<T> {
    frames: FrameStream<BoxStream<'static, Result<Bytes, ClientError>>>,
    data: PhantomData<T>,
}

impl<T> EventStream<T>
where
    T: DeserializeOwned,
{
    pub fn new(frames: FrameStream<BoxStream<'static, Result<Bytes, ClientError>>>) -> Self {
        Self {
            frames,
            data: PhantomData,
        }
    }
}

impl<T> Unpin for EventStream<T> {}

impl<T> Stream for EventStream<T>
where
    T: DeserializeOwned,
{
    type Item = Result<WatchEvent<T>, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.frames).poll_next(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                trace!("decoding frame: {}", String::from_utf8_lossy(&frame));
                let event = serde_json::from_slice::<WatchEvent<T>>(&frame).map_err(|err| {
                    error!(
                        "watch frame decode error, frame_len: {}, error: {}",
                        frame.len(),
                        err
                    );
                    error!("raw frame: {}", String::from_utf8_lossy(&frame));
                    ClientError::from(err)
                });
                Poll::Ready(Some(event))
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod test {

    use bytes::Bytes;
    use futures_util::stream::iter;
    use futures_util::StreamExt;

    use k8_rest_types::core::Pod;
    use k8_rest_types::WatchEvent;

    use crate::ClientError;

    use super::super::FrameStream;
    use super::EventStream;

    fn reader(body: &str) -> EventStream<Pod> {
        let owned: Vec<Result<Bytes, ClientError>> = vec![Ok(Bytes::from(body.to_string()))];
        EventStream::new(FrameStream::new(iter(owned).boxed()))
    }

    #[tokio::test]
    async fn test_typed_events() {
        let body = concat!(
            r#"{"type":"ADDED","object":{"metadata":{"name":"a","resourceVersion":"1"}}}"#,
            "\n",
            r#"{"type":"MODIFIED","object":{"metadata":{"name":"a","resourceVersion":"2"}}}"#,
            "\n",
        );
        let mut events = reader(body);

        match events.next().await.unwrap().unwrap() {
            WatchEvent::Added(pod) => assert_eq!(pod.metadata.resource_version, "1"),
            other => panic!("unexpected: {}", other.label()),
        }
        match events.next().await.unwrap().unwrap() {
            WatchEvent::Modified(pod) => assert_eq!(pod.metadata.resource_version, "2"),
            other => panic!("unexpected: {}", other.label()),
        }
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_event_decodes_status() {
        let body =
            r#"{"type":"ERROR","object":{"kind":"Status","status":"Failure","code":410,"reason":"Expired"}}"#;
        let mut events = reader(&format!("{body}\n"));

        match events.next().await.unwrap().unwrap() {
            WatchEvent::Error(status) => assert_eq!(status.code, Some(410)),
            other => panic!("unexpected: {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_decode_error() {
        let mut events = reader("{not json}\n");
        let result = events.next().await.unwrap();
        assert!(matches!(result, Err(ClientError::Json { .. })));
    }
}
