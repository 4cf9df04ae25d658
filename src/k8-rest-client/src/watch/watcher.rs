use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use futures_util::stream::Stream;
use futures_util::StreamExt;
use http::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use k8_rest_types::Metadata;
use k8_rest_types::ObjectList;
use k8_rest_types::Resource;
use k8_rest_types::Status;
use k8_rest_types::WatchEvent;

use crate::ClientError;
use crate::K8Request;

use super::backoff::Backoff;

const CHANNEL_CAPACITY: usize = 32;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// lifecycle notifications produced by a [`Watcher`]
#[derive(Debug)]
pub enum WatcherEvent<T> {
    /// the watch HTTP stream opened successfully
    Opened,
    /// the synthesized snapshot batch is complete; emitted once per
    /// successful open that follows a reset (or the bootstrap list)
    InitialListSent,
    /// an Added/Modified/Deleted change; bookmarks are never forwarded
    Event(WatchEvent<T>),
    /// the watcher could not resume from its tracked version; consumers
    /// feeding a cache from events must discard their state
    Reset,
    /// terminal error; followed by `Closed`
    Error(ClientError),
    /// emitted exactly once, after stop or a terminal error
    Closed,
}

/// stop handle; stopping is idempotent
#[derive(Clone)]
pub struct WatcherHandle {
    cancel: CancellationToken,
}

impl WatcherHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// long-lived watch over a request, resuming across disconnects and
/// version expiry.
///
/// The request identifies the collection (or, with a name, a single
/// object) to watch; the watcher owns the watch parameters
pub struct Watcher<T> {
    request: K8Request,
    initial_version: String,
    is_list_watch: bool,
    bookmarks: bool,
    cancel: CancellationToken,
    data: std::marker::PhantomData<T>,
}

impl<T> Watcher<T>
where
    T: Resource,
{
    /// `is_list_watch` defaults to whether the request has no name set.
    /// Bookmarks are requested by default for list watches
    pub fn new(
        mut request: K8Request,
        initial_version: impl Into<String>,
        is_list_watch: Option<bool>,
    ) -> Self {
        let is_list_watch = is_list_watch.unwrap_or(request.name_ref().is_none());
        // watch parameters are owned here; the base request stays a
        // plain GET so it can serve relists
        request.watch_version = None;

        Self {
            request,
            initial_version: initial_version.into(),
            is_list_watch,
            bookmarks: is_list_watch,
            cancel: CancellationToken::new(),
            data: std::marker::PhantomData,
        }
    }

    pub fn bookmarks(mut self, enabled: bool) -> Self {
        self.bookmarks = enabled;
        self
    }

    pub fn handle(&self) -> WatcherHandle {
        WatcherHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// spawn the driver task and return the event stream
    pub fn run(self) -> WatcherStream<T> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = WatcherHandle {
            cancel: self.cancel.clone(),
        };

        let driver = Driver {
            request: self.request,
            is_list_watch: self.is_list_watch,
            bookmarks: self.bookmarks,
            tracked: self.initial_version,
            cancel: self.cancel,
            tx,
        };
        tokio::spawn(driver.run());

        WatcherStream { rx, handle }
    }
}

/// consumer side of a running watcher
pub struct WatcherStream<T> {
    rx: mpsc::Receiver<WatcherEvent<T>>,
    handle: WatcherHandle,
}

impl<T> WatcherStream<T> {
    pub fn handle(&self) -> WatcherHandle {
        self.handle.clone()
    }
}

impl<T> Stream for WatcherStream<T> {
    type Item = WatcherEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

fn is_expired(status: &Status) -> bool {
    status.code == Some(StatusCode::GONE.as_u16())
        || matches!(status.reason.as_deref(), Some("Expired") | Some("Gone"))
}

/// a 4xx other than 410/429 will not get better by retrying
fn is_terminal(err: &ClientError) -> bool {
    match err {
        ClientError::Status { source } => {
            source.code.is_client_error()
                && source.code != StatusCode::GONE
                && source.code != StatusCode::TOO_MANY_REQUESTS
        }
        _ => false,
    }
}

struct Driver<T> {
    request: K8Request,
    is_list_watch: bool,
    bookmarks: bool,
    tracked: String,
    cancel: CancellationToken,
    tx: mpsc::Sender<WatcherEvent<T>>,
}

impl<T> Driver<T>
where
    T: Resource,
{
    async fn run(mut self) {
        if let Err(err) = self.drive().await {
            warn!("watcher terminated: {err}");
            let _ = self.tx.send(WatcherEvent::Error(err)).await;
        }
        let _ = self.tx.send(WatcherEvent::Closed).await;
    }

    /// true when the consumer is still listening
    async fn emit(&self, event: WatcherEvent<T>) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// sleep out a backoff delay; false when stopped meanwhile
    async fn pause(&self, backoff: &mut Backoff) -> bool {
        let delay = backoff.next_delay();
        debug!(?delay, "backing off before reconnect");
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn drive(&mut self) -> Result<(), ClientError> {
        let mut backoff = Backoff::new(BACKOFF_BASE, BACKOFF_MAX);
        // a list watch with no starting version begins from a consistent
        // list snapshot
        let mut need_snapshot = self.is_list_watch && self.tracked.is_empty();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if need_snapshot {
                match self.snapshot().await {
                    Ok(true) => need_snapshot = false,
                    Ok(false) => return Ok(()),
                    Err(err) if is_terminal(&err) => return Err(err),
                    Err(err) => {
                        warn!("snapshot failed: {err}, retrying");
                        if !self.pause(&mut backoff).await {
                            return Ok(());
                        }
                        continue;
                    }
                }
            }

            let mut attempt = self.request.clone().watch(self.tracked.clone());
            if self.bookmarks {
                attempt = attempt.query("allowWatchBookmarks", "true");
            }

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = attempt.execute() => result,
            };

            let response = match opened {
                Ok(response) => response,
                Err(err) => {
                    warn!("watch open failed: {err}");
                    if !self.pause(&mut backoff).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            if response.status_code() == StatusCode::GONE {
                debug!(version = %self.tracked, "tracked version expired");
                if !self.begin_reset().await {
                    return Ok(());
                }
                need_snapshot = true;
                continue;
            }
            if response.is_error() {
                let mut response = response;
                let err: ClientError = response.status_error().await.into();
                if is_terminal(&err) {
                    return Err(err);
                }
                warn!("watch open rejected: {err}");
                if !self.pause(&mut backoff).await {
                    return Ok(());
                }
                continue;
            }

            if !self.emit(WatcherEvent::Opened).await {
                return Ok(());
            }
            backoff.reset();

            let mut events = response.into_events::<T>()?;
            loop {
                let next = tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(()),
                    item = events.next() => item,
                };

                match next {
                    // server closed the stream: reopen immediately from
                    // the tracked version
                    None => {
                        debug!(version = %self.tracked, "watch disconnected, resuming");
                        break;
                    }
                    Some(Ok(event)) => {
                        if let Some(version) = event.resource_version() {
                            self.tracked = version.to_owned();
                        }
                        match event {
                            WatchEvent::Bookmark(_) => {
                                debug!(version = %self.tracked, "bookmark");
                            }
                            WatchEvent::Error(status) if is_expired(&status) => {
                                debug!(reason = ?status.reason, "watch expired mid-stream");
                                if !self.begin_reset().await {
                                    return Ok(());
                                }
                                need_snapshot = true;
                                break;
                            }
                            WatchEvent::Error(status) => {
                                warn!("watch error event: {:?}", status.reason);
                                if !self.pause(&mut backoff).await {
                                    return Ok(());
                                }
                                break;
                            }
                            event => {
                                if !self.emit(WatcherEvent::Event(event)).await {
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!("watch stream failed: {err}, reconnecting");
                        if !self.pause(&mut backoff).await {
                            return Ok(());
                        }
                        break;
                    }
                }
            }
        }
    }

    async fn begin_reset(&mut self) -> bool {
        self.tracked.clear();
        self.emit(WatcherEvent::Reset).await
    }

    /// re-baseline after a reset (or at bootstrap).  A list watch LISTs
    /// the collection, replays it as Added events and marks the batch
    /// with `InitialListSent`; a single-object watch re-GETs the object.
    /// Returns false when the consumer is gone
    async fn snapshot(&mut self) -> Result<bool, ClientError> {
        if self.is_list_watch {
            let fetch = self.request.clone().get();
            let list = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                result = fetch.fetch_required::<ObjectList<T>>() => result?,
            };
            debug!(
                version = %list.metadata.resource_version,
                items = list.items.len(),
                "list snapshot"
            );
            self.tracked = list.metadata.resource_version.clone();
            for item in list.items {
                if !self.emit(WatcherEvent::Event(WatchEvent::Added(item))).await {
                    return Ok(false);
                }
            }
            if !self.emit(WatcherEvent::InitialListSent).await {
                return Ok(false);
            }
        } else {
            let fetch = self.request.clone().get();
            let found = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                result = fetch.fetch::<T>() => result?,
            };
            if let Some(item) = found {
                self.tracked = item.metadata().resource_version.clone();
                if !self.emit(WatcherEvent::Event(WatchEvent::Added(item))).await {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
