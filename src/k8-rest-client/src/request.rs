use std::io::Error as IoError;
use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use k8_rest_types::scheme;
use k8_rest_types::Metadata;
use k8_rest_types::Resource;

use crate::exec::MultiplexerConnector;
use crate::ClientError;
use crate::CredentialProvider;
use crate::Transport;

/// ordered multimap with case-preserving keys; emission order is
/// insertion order, stable within a key
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MultiMap {
    entries: Vec<(String, Vec<String>)>,
}

impl MultiMap {
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => self.entries[index].1.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// replace all values for a key, keeping its original position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                let values = &mut self.entries[index].1;
                values.clear();
                values.push(value);
            }
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// flattened (key, value) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(key, values)| {
            values.iter().map(move |value| (key.as_str(), value.as_str()))
        })
    }
}

pub type BodyStream = BoxStream<'static, Result<Bytes, IoError>>;

/// request payload.  A stream body is shared between clones and can be
/// consumed by exactly one execution
pub enum RequestBody {
    None,
    Bytes(Bytes),
    Text(String),
    Json(Value),
    Stream(Arc<Mutex<Option<BodyStream>>>),
}

impl Clone for RequestBody {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Bytes(bytes) => Self::Bytes(bytes.clone()),
            Self::Text(text) => Self::Text(text.clone()),
            Self::Json(value) => Self::Json(value.clone()),
            Self::Stream(shared) => Self::Stream(shared.clone()),
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bytes(bytes) => write!(f, "Bytes({})", bytes.len()),
            Self::Text(text) => write!(f, "Text({})", text.len()),
            Self::Json(_) => write!(f, "Json"),
            Self::Stream(_) => write!(f, "Stream"),
        }
    }
}

pub(crate) const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// fluent request against the Kubernetes REST surface.
///
/// Setters consume and return the request so calls chain; [`Self::clone`]
/// produces an independent variation.  A request never mutates during
/// execution, so one request may be executed concurrently any number of
/// times.  Setter errors (reserved header, bad raw URI) are deferred and
/// surfaced when the request is executed, the same way
/// `http::request::Builder` reports its failures.
#[derive(Clone)]
pub struct K8Request {
    pub(crate) method: Method,
    pub(crate) raw_uri: Option<String>,
    pub(crate) group: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) resource: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) subresource: Option<String>,
    pub(crate) accept: String,
    pub(crate) media_type: String,
    pub(crate) headers: MultiMap,
    pub(crate) query: MultiMap,
    pub(crate) body: RequestBody,
    pub(crate) stream_response: bool,
    pub(crate) watch_version: Option<String>,
    pub(crate) old_style_watch: bool,
    pub(crate) invalid: Option<String>,
    // shared handles; never mutated through the request
    pub(crate) base: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) mux: Option<Arc<dyn MultiplexerConnector>>,
}

fn normalize(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

impl K8Request {
    pub(crate) fn new(
        base: String,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        mux: Option<Arc<dyn MultiplexerConnector>>,
    ) -> Self {
        Self {
            method: Method::GET,
            raw_uri: None,
            group: None,
            version: None,
            namespace: None,
            resource: None,
            name: None,
            subresource: None,
            accept: DEFAULT_MEDIA_TYPE.to_owned(),
            media_type: DEFAULT_MEDIA_TYPE.to_owned(),
            headers: MultiMap::default(),
            query: MultiMap::default(),
            body: RequestBody::None,
            stream_response: false,
            watch_version: None,
            old_style_watch: false,
            invalid: None,
            base,
            transport,
            credentials,
            mux,
        }
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        if self.invalid.is_none() {
            self.invalid = Some(message.into());
        }
        self
    }

    //
    // setters; empty strings normalize to absent
    //

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn get(self) -> Self {
        self.method(Method::GET)
    }

    pub fn post(self) -> Self {
        self.method(Method::POST)
    }

    pub fn put(self) -> Self {
        self.method(Method::PUT)
    }

    pub fn delete(self) -> Self {
        self.method(Method::DELETE)
    }

    pub fn patch(self) -> Self {
        self.method(Method::PATCH)
    }

    /// absolute path from the cluster host, bypassing piecemeal URL
    /// construction; must begin with `/`
    pub fn raw_uri(mut self, uri: impl Into<String>) -> Self {
        match normalize(uri) {
            Some(uri) if !uri.starts_with('/') => {
                self.fail(format!("raw uri '{uri}' must begin with '/'"))
            }
            other => {
                self.raw_uri = other;
                self
            }
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = normalize(group);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = normalize(version);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = normalize(namespace);
        self
    }

    /// plural resource path segment, e.g. `pods`
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = normalize(resource);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = normalize(name);
        self
    }

    pub fn subresource(mut self, subresource: impl Into<String>) -> Self {
        self.subresource = normalize(subresource);
        self
    }

    /// percent-encodes each part and joins with `/`
    pub fn subresources(mut self, parts: &[&str]) -> Self {
        let joined = parts
            .iter()
            .map(|part| encode_component(part))
            .collect::<Vec<_>>()
            .join("/");
        self.subresource = normalize(joined);
        self
    }

    pub fn status(self) -> Self {
        self.subresource("status")
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    /// media type of the request body; rendered as
    /// `<media_type>; charset=UTF-8`
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// custom header.  `Accept` and `Content-Type` are owned by the
    /// executor and are rejected here
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.eq_ignore_ascii_case("accept") || key.eq_ignore_ascii_case("content-type") {
            return self.fail(format!("header '{key}' is reserved"));
        }
        self.headers.append(key, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.append(key, value);
        self
    }

    pub fn body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(bytes.into());
        self
    }

    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = RequestBody::Text(text.into());
        self
    }

    pub fn body_stream(mut self, stream: BodyStream) -> Self {
        self.body = RequestBody::Stream(Arc::new(Mutex::new(Some(stream))));
        self
    }

    /// arbitrary object, JSON-encoded with null omission
    pub fn body_json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.body = RequestBody::Json(value);
                self
            }
            Err(err) => self.fail(format!("body encoding failed: {err}")),
        }
    }

    /// return after response headers instead of buffering the body
    pub fn stream_response(mut self, stream: bool) -> Self {
        self.stream_response = stream;
        self
    }

    /// turn the request into a watch; an empty version watches from the
    /// current state.  Forces streaming completion
    pub fn watch(mut self, resource_version: impl Into<String>) -> Self {
        self.watch_version = Some(resource_version.into());
        self
    }

    /// `/api/v1/watch/...` path layout instead of the `?watch=1` form
    pub fn old_style_watch(mut self, old_style: bool) -> Self {
        self.old_style_watch = old_style;
        self
    }

    /// group/version/kind from an `apiVersion` string and a kind; the
    /// path segment comes from the scheme, or the pluralization
    /// heuristic for unregistered kinds
    pub fn gvk(mut self, api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        self.group = normalize(group);
        self.version = normalize(version);
        self.resource = normalize(scheme::plural(group, kind));
        self
    }

    /// target the request at an object: GVK from its type, namespace from
    /// its metadata, name only when the object has a uid (an empty uid
    /// means the object is being created, so the collection is targeted)
    pub fn set<T: Resource>(mut self, object: &T, set_body: bool) -> Self {
        let gvk = scheme::gvk::<T>().unwrap_or_else(|_| {
            k8_rest_types::GroupVersionKind::new(
                T::GROUP,
                T::VERSION,
                T::KIND,
                scheme::guess_path(T::KIND),
            )
        });
        self.group = normalize(gvk.group);
        self.version = normalize(gvk.version);
        self.resource = normalize(gvk.plural);

        let meta = object.metadata();
        self.namespace = normalize(meta.namespace.clone());
        if !meta.uid.is_empty() {
            self.name = normalize(meta.name.clone());
        }

        if set_body {
            self.body_json(object)
        } else {
            self
        }
    }

    /// untyped variant of [`Self::set`]; GVK comes from the value's
    /// declared `apiVersion`/`kind` fields
    pub fn set_value(mut self, object: &Value, set_body: bool) -> Self {
        let api_version = object.get("apiVersion").and_then(Value::as_str);
        let kind = object.get("kind").and_then(Value::as_str);
        let (api_version, kind) = match (api_version, kind) {
            (Some(api_version), Some(kind)) => (api_version.to_owned(), kind.to_owned()),
            _ => return self.fail("object does not declare apiVersion/kind"),
        };
        self = self.gvk(&api_version, &kind);

        if let Some(meta) = object.get("metadata") {
            let namespace = meta.get("namespace").and_then(Value::as_str).unwrap_or("");
            self.namespace = normalize(namespace);
            let uid = meta.get("uid").and_then(Value::as_str).unwrap_or("");
            if !uid.is_empty() {
                let name = meta.get("name").and_then(Value::as_str).unwrap_or("");
                self.name = normalize(name);
            }
        }

        if set_body {
            self.body = RequestBody::Json(object.clone());
        }
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        if dry_run {
            self.query.set("dryRun", "All");
        } else {
            self.query.remove("dryRun");
        }
        self
    }

    pub fn field_manager(self, manager: impl Into<String>) -> Self {
        self.query("fieldManager", manager)
    }

    pub fn field_selector(self, selector: impl Into<String>) -> Self {
        self.query("fieldSelector", selector)
    }

    pub fn label_selector(self, selector: impl Into<String>) -> Self {
        self.query("labelSelector", selector)
    }

    //
    // getters, http::request::Builder style
    //

    pub fn method_ref(&self) -> &Method {
        &self.method
    }

    pub fn raw_uri_ref(&self) -> Option<&str> {
        self.raw_uri.as_deref()
    }

    pub fn group_ref(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn version_ref(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn namespace_ref(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn resource_ref(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn name_ref(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn subresource_ref(&self) -> Option<&str> {
        self.subresource.as_deref()
    }

    pub fn watch_version_ref(&self) -> Option<&str> {
        self.watch_version.as_deref()
    }

    pub fn headers_ref(&self) -> &MultiMap {
        &self.headers
    }

    pub fn query_ref(&self) -> &MultiMap {
        &self.query
    }

    /// render the full request URL
    pub fn build_uri(&self) -> Result<String, ClientError> {
        if let Some(message) = &self.invalid {
            return Err(ClientError::Config(message.clone()));
        }

        if let Some(raw) = &self.raw_uri {
            if self.group.is_some()
                || self.version.is_some()
                || self.namespace.is_some()
                || self.resource.is_some()
                || self.name.is_some()
                || self.subresource.is_some()
            {
                return Err(ClientError::Config(
                    "raw uri cannot be combined with piecemeal URL components".to_owned(),
                ));
            }
            return Ok(format!("{}{}", self.base, raw));
        }

        let version = self
            .version
            .as_deref()
            .ok_or_else(|| ClientError::Config("request has no api version".to_owned()))?;
        let resource = self
            .resource
            .as_deref()
            .ok_or_else(|| ClientError::Config("request has no resource type".to_owned()))?;

        let mut uri = self.base.clone();
        match &self.group {
            Some(group) => {
                uri.push_str("/apis/");
                uri.push_str(group);
            }
            None => uri.push_str("/api"),
        }
        uri.push('/');
        uri.push_str(version);
        if self.old_style_watch && self.watch_version.is_some() {
            uri.push_str("/watch");
        }
        if let Some(namespace) = &self.namespace {
            uri.push_str("/namespaces/");
            uri.push_str(&encode_component(namespace));
        }
        uri.push('/');
        uri.push_str(resource);
        if let Some(name) = &self.name {
            uri.push('/');
            uri.push_str(&encode_component(name));
        }
        if let Some(subresource) = &self.subresource {
            uri.push('/');
            uri.push_str(subresource);
        }

        let mut pairs: Vec<String> = self
            .query
            .iter()
            .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
            .collect();
        if let Some(watch_version) = &self.watch_version {
            pairs.push("watch=1".to_owned());
            if !watch_version.is_empty() {
                pairs.push(format!("resourceVersion={}", encode_component(watch_version)));
            }
        }
        if !pairs.is_empty() {
            uri.push('?');
            uri.push_str(&pairs.join("&"));
        }

        trace!(%uri, "built request uri");
        Ok(uri)
    }
}

impl std::fmt::Debug for K8Request {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("K8Request")
            .field("method", &self.method)
            .field("raw_uri", &self.raw_uri)
            .field("group", &self.group)
            .field("version", &self.version)
            .field("namespace", &self.namespace)
            .field("resource", &self.resource)
            .field("name", &self.name)
            .field("subresource", &self.subresource)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("watch_version", &self.watch_version)
            .finish()
    }
}

/// percent-encode everything outside the unreserved set
pub(crate) fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}
