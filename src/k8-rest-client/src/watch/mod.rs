mod backoff;
mod frames;
mod reader;
mod watcher;

pub use frames::FrameStream;
pub use reader::EventStream;
pub use watcher::{Watcher, WatcherEvent, WatcherHandle, WatcherStream};
