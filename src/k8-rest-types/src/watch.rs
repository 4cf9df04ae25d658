use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::Metadata;
use crate::Status;

/// single change event from a watch stream.
/// wire form is `{"type": "ADDED", "object": {...}}`; the object payload
/// is a `Status` for ERROR frames and a bare metadata stub for bookmarks
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "type", content = "object")]
#[serde(bound(serialize = "T: Serialize"))]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub enum WatchEvent<T> {
    #[serde(rename = "ADDED")]
    Added(T),
    #[serde(rename = "MODIFIED")]
    Modified(T),
    #[serde(rename = "DELETED")]
    Deleted(T),
    #[serde(rename = "BOOKMARK")]
    Bookmark(BookmarkObject),
    #[serde(rename = "ERROR")]
    Error(Status),
}

impl<T> WatchEvent<T>
where
    T: Metadata,
{
    /// resource version carried by the event, if any
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => {
                let version = &obj.metadata().resource_version;
                (!version.is_empty()).then_some(version.as_str())
            }
            Self::Bookmark(bookmark) => {
                let version = &bookmark.metadata.resource_version;
                (!version.is_empty()).then_some(version.as_str())
            }
            Self::Error(_) => None,
        }
    }
}

impl<T> WatchEvent<T> {
    pub fn is_bookmark(&self) -> bool {
        matches!(self, Self::Bookmark(_))
    }

    /// wire label, for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added(_) => "ADDED",
            Self::Modified(_) => "MODIFIED",
            Self::Deleted(_) => "DELETED",
            Self::Bookmark(_) => "BOOKMARK",
            Self::Error(_) => "ERROR",
        }
    }
}

/// bookmark payload; only the resource version is meaningful
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkObject {
    pub metadata: BookmarkMeta,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkMeta {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
}
