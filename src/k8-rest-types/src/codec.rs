use serde::de::DeserializeOwned;
use serde::Serialize;

/// deep copy through the wire representation; null fields are dropped
/// on the way, the same as a request/response round trip would
pub fn clone_via_json<T>(value: &T) -> Result<T, serde_json::Error>
where
    T: Serialize + DeserializeOwned,
{
    serde_json::from_value(serde_json::to_value(value)?)
}
