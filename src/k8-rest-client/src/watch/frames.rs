use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures_util::stream::Stream;
use tracing::trace;

use crate::ClientError;

const SEPARATOR: u8 = b'\n';

/// splits a watch response body into newline-delimited frames.
/// Bound to a single response; ends when the inner stream ends
pub struct FrameStream<S> {
    stream: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S> FrameStream<S>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            done: false,
        }
    }

    fn take_frame(&mut self) -> Option<Bytes> {
        let position = self.buffer.iter().position(|&byte| byte == SEPARATOR)?;
        let mut frame: Vec<u8> = self.buffer.drain(..=position).collect();
        frame.pop();
        trace!(len = frame.len(), "frame complete");
        Some(frame.into())
    }
}

impl<S> Unpin for FrameStream<S> where S: Unpin {}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, ClientError>> + Unpin,
{
    type Item = Result<Bytes, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Poll::Ready(Some(Ok(frame)));
            }

            if self.done {
                // a trailing partial frame is still a frame
                if self.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let frame: Bytes = std::mem::take(&mut self.buffer).into();
                return Poll::Ready(Some(Ok(frame)));
            }

            match Pin::new(&mut self.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    trace!(len = chunk.len(), "chunk received");
                    self.buffer.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => self.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
